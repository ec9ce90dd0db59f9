//! Provider error classification.
//!
//! Maps a raw error onto the fixed [`ErrorKind`] taxonomy that drives the
//! coordinator's retry policy. Classification is ordered and the first
//! match wins: cancellation is recognized before everything else so a
//! cancelled request is never mistaken for a transport failure, and
//! throttling outranks the generic 5xx buckets because "429 while
//! streaming" must retry, not advance.
//!
//! Matching is substring-based over the lowered error text, against the
//! dictionaries below. The classifier is a total function: it never fails
//! and never panics.

use ax_domain::{Error, ErrorKind};

const CANCELLED: &[&str] = &[
    "context canceled",
    "context cancelled",
    "deadline exceeded",
    "request cancelled",
    "operation was canceled",
];

const THROTTLING: &[&str] = &[
    "429",
    "529",
    "throttl", // ThrottlingException, throttled, throttling
    "too many requests",
    "rate limit",
    "rate_limit",
    "resource_exhausted",
    "quota exceeded",
    "overloaded",
];

const ZERO_CANDIDATES: &[&str] = &[
    "zero candidates",
    "no candidates",
    "candidates is empty",
];

const EMPTY_CONTENT: &[&str] = &[
    "choice.content is empty string",
    "content is empty",
    "empty content",
    "empty response",
    // A malformed function call yields unusable content; it must never be
    // classified as max_tokens.
    "malformed_function_call",
];

const MAX_TOKENS: &[&str] = &[
    "max_tokens",
    "max tokens",
    "maximum context length",
    "context_length_exceeded",
    "context length",
    "input is too long",
    "prompt is too long",
    "validationexception",
];

const STREAM: &[&str] = &[
    "stream error",
    "stream closed",
    "stream reset",
    "error reading stream",
];

const CONNECTION: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "broken pipe",
    "eof",
    "no such host",
    "dial tcp",
    "tls handshake",
    "timeout",
    "timed out",
    "502",
    "503",
    "504",
    "bad gateway",
    "service unavailable",
];

const INTERNAL: &[&str] = &[
    "500",
    "internal_error",
    "internal server error",
    "internalserverexception",
    "internal failure",
];

fn matches_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Classify a generation error. First match wins; see the module docs for
/// the ordering rationale.
pub fn classify(error: &Error) -> ErrorKind {
    // Cancellation is checked on the variant as well as the text so a
    // context error surfaced through a provider wrapper still short-circuits.
    if error.is_cancellation() {
        return ErrorKind::Cancelled;
    }

    let text = error.to_string().to_lowercase();
    if matches_any(&text, CANCELLED) {
        return ErrorKind::Cancelled;
    }
    if matches_any(&text, THROTTLING) {
        return ErrorKind::Throttling;
    }
    if matches_any(&text, ZERO_CANDIDATES) {
        return ErrorKind::ZeroCandidates;
    }
    if matches_any(&text, EMPTY_CONTENT) {
        return ErrorKind::EmptyContent;
    }
    if matches_any(&text, MAX_TOKENS) {
        return ErrorKind::MaxTokens;
    }
    if matches_any(&text, STREAM) {
        return ErrorKind::Stream;
    }
    if matches_any(&text, CONNECTION) {
        return ErrorKind::Connection;
    }
    if matches_any(&text, INTERNAL) {
        return ErrorKind::Internal;
    }

    // Text gave nothing away; fall back on the error variant.
    match error {
        Error::Stream(_) => ErrorKind::Stream,
        Error::Io(_) | Error::Timeout(_) => ErrorKind::Connection,
        _ => ErrorKind::Unclassified,
    }
}
