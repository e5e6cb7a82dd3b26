use crate::util::json::{Parsed, finite_f64, parse_api_body_value};
use serde::Serialize;
use serde_json::Value;
use tokio_stream::{Stream, StreamExt};

/// token 用量。各字段只接受有限的非负数，其它值视为缺失。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u64>,
}

fn token_count(v: Option<&Value>) -> Option<u64> {
    finite_f64(v).filter(|f| *f >= 0.0).map(|f| f.trunc() as u64)
}

/// 读取 `body.response.usageMetadata`。
pub fn extract_usage_metadata(body: &Value) -> Option<UsageMetadata> {
    let usage = body.get("response")?.get("usageMetadata")?.as_object()?;
    Some(UsageMetadata {
        total_token_count: token_count(usage.get("totalTokenCount")),
        prompt_token_count: token_count(usage.get("promptTokenCount")),
        candidates_token_count: token_count(usage.get("candidatesTokenCount")),
        cached_content_token_count: token_count(usage.get("cachedContentTokenCount")),
    })
}

/// 单行 SSE：非 `data:` 行或没有用量时为 Absent，JSON 损坏时为 Malformed。
fn usage_from_sse_line(line: &str) -> Parsed<UsageMetadata> {
    let Some(data) = line.strip_prefix("data:") else {
        return Parsed::Absent;
    };
    match parse_api_body_value(data) {
        Parsed::Value(body) => match extract_usage_metadata(&body) {
            Some(usage) => Parsed::Value(usage),
            None => Parsed::Absent,
        },
        Parsed::Absent => Parsed::Absent,
        Parsed::Malformed(reason) => Parsed::Malformed(reason),
    }
}

/// 扫描一整段 SSE 文本，返回最后一次出现的用量（流式用量是累计的，后出现的覆盖先出现的）。
pub fn extract_usage_from_sse_payload(payload: &str) -> Option<UsageMetadata> {
    payload
        .lines()
        .filter_map(|line| usage_from_sse_line(line.trim_end_matches('\r')).ok_logged("SSE 数据行"))
        .last()
}

/// 单行 SSE 的最大长度；超过后整行丢弃并计入 malformed。
pub const MAX_SSE_LINE_BYTES: usize = 1024 * 1024;

/// 增量版本：逐块喂入原始字节，跨块拼接行。
#[derive(Debug, Default)]
pub struct SseUsageTracker {
    buf: Vec<u8>,
    /// 正在丢弃一条超长行，直到下一个换行为止。
    skipping: bool,
    latest: Option<UsageMetadata>,
    malformed_lines: usize,
}

impl SseUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, mut chunk: &[u8]) {
        if self.skipping {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(nl) => {
                    self.skipping = false;
                    chunk = &chunk[nl + 1..];
                }
                None => return,
            }
        }
        self.buf.extend_from_slice(chunk);

        let mut processed = 0;
        while let Some(nl_rel) = self.buf[processed..].iter().position(|&b| b == b'\n') {
            let nl = processed + nl_rel;
            let mut line = &self.buf[processed..nl];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            processed = nl + 1;
            if line.len() > MAX_SSE_LINE_BYTES {
                self.drop_oversized_line();
            } else {
                self.process_line(&line);
            }
        }
        self.buf.drain(..processed);

        if self.buf.len() > MAX_SSE_LINE_BYTES {
            self.buf.clear();
            self.skipping = true;
            self.drop_oversized_line();
        }
    }

    fn drop_oversized_line(&mut self) {
        self.malformed_lines += 1;
        tracing::debug!("跳过超过 {MAX_SSE_LINE_BYTES} 字节的 SSE 行");
    }

    fn process_line(&mut self, line: &str) {
        match usage_from_sse_line(line) {
            Parsed::Value(usage) => self.latest = Some(usage),
            Parsed::Absent => {}
            Parsed::Malformed(reason) => {
                self.malformed_lines += 1;
                tracing::debug!("跳过无法解析的 SSE 数据行: {reason}");
            }
        }
    }

    pub fn latest(&self) -> Option<UsageMetadata> {
        self.latest
    }

    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    /// 流结束：处理末尾没有换行的残留行。
    pub fn finish(mut self) -> Option<UsageMetadata> {
        if !self.skipping && !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest);
            self.process_line(line.trim_end_matches('\r'));
        }
        self.latest
    }
}

/// 消费一个字节块流并返回最终用量；底层流出错时直接返回该错误。
pub async fn track_stream_usage<S, B, E>(mut stream: S) -> Result<Option<UsageMetadata>, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut tracker = SseUsageTracker::new();
    while let Some(chunk) = stream.next().await {
        tracker.feed(chunk?.as_ref());
    }
    Ok(tracker.finish())
}
