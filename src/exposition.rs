//! Just enough of the text exposition format to find the gateway's
//! `push_time_seconds` samples and take their label blocks apart.

use thiserror::Error;

use crate::model::{LabelSet, Sample};

pub static PUSH_TIME_METRIC: &str = "push_time_seconds";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("label block is not terminated")]
    UnterminatedLabels,
    #[error("sample has no value")]
    MissingTimestamp,
    #[error("invalid push timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("malformed label pair {0:?}")]
    MalformedLabel(String),
    #[error("sample has no job label")]
    MissingJob,
}

/// Returns every line of `body` that starts with `push_time_seconds{`, in
/// payload order.
pub fn find_push_samples(body: &str) -> impl Iterator<Item = &str> {
    body.lines().filter(|line| {
        line.strip_prefix(PUSH_TIME_METRIC)
            .map_or(false, |rest| rest.starts_with('{'))
    })
}

/// Splits a matched line into its identity (name and label block) and push
/// timestamp.
///
/// Timestamps that do not parse to a finite float are rejected rather than
/// read as zero, so a corrupt line never looks maximally stale.
pub fn parse_sample(line: &str) -> Result<Sample, SampleError> {
    let end = label_block_end(line).ok_or(SampleError::UnterminatedLabels)?;
    let (identity, rest) = line.split_at(end + 1);

    let raw = rest
        .split_whitespace()
        .next()
        .ok_or(SampleError::MissingTimestamp)?;
    let timestamp = raw
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| SampleError::InvalidTimestamp(raw.to_string()))?;

    Ok(Sample {
        line: line.to_string(),
        identity: identity.to_string(),
        timestamp,
    })
}

/// Parses `push_time_seconds{k="v",...}` into its labels.
pub fn parse_labels(identity: &str) -> Result<LabelSet, SampleError> {
    let inner = identity
        .strip_prefix(PUSH_TIME_METRIC)
        .and_then(|rest| rest.strip_prefix('{'))
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or(SampleError::UnterminatedLabels)?;

    let mut labels = Vec::new();
    for pair in split_pairs(inner) {
        let pair = pair.trim();
        if pair.is_empty() {
            // trailing comma
            continue;
        }
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| SampleError::MalformedLabel(pair.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(SampleError::MalformedLabel(pair.to_string()));
        }
        labels.push((key.to_string(), unquote(value.trim())));
    }

    Ok(LabelSet(labels))
}

// byte offset of the `}` closing the label block, skipping quoted values
fn label_block_end(line: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '}' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

// splits on commas outside of quoted values
fn split_pairs(inner: &str) -> Vec<&str> {
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in inner.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                pairs.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pairs.push(&inner[start..]);
    pairs
}

fn unquote(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = "# HELP push_time_seconds Last Unix time when changing this group in the Pushgateway succeeded.
# TYPE push_time_seconds gauge
push_time_seconds{hostName=\"XXX\",instance=\"localhost:9091\",job=\"push_gateway\"} 1.5411578179228673e+09
push_time_seconds{instance=\"b\",job=\"batch\"} 1.5411578e+09
pushgateway_build_info{version=\"0.6.0\"} 1
push_failure_time_seconds{instance=\"b\",job=\"batch\"} 0
";

    #[test]
    fn test_find_push_samples() {
        let found: Vec<_> = find_push_samples(PAYLOAD).collect();
        assert_eq!(found.len(), 2);
        assert!(found[0].contains("job=\"push_gateway\""));
        assert!(found[1].contains("job=\"batch\""));
    }

    #[test]
    fn test_find_push_samples_none() {
        let body = "# TYPE go_goroutines gauge\ngo_goroutines 12\npush_time_seconds 3\n";
        assert_eq!(find_push_samples(body).count(), 0);
    }

    #[test]
    fn test_parse_sample() {
        let line = "push_time_seconds{instance=\"b\",job=\"batch\"} 1.5411578e+09";
        let sample = parse_sample(line).unwrap();
        assert_eq!(sample.identity, "push_time_seconds{instance=\"b\",job=\"batch\"}");
        assert_eq!(sample.timestamp, 1.5411578e9);
        assert_eq!(sample.line, line);
    }

    #[test]
    fn test_parse_sample_value_with_spaces_and_braces() {
        let line = "push_time_seconds{job=\"a b}\"} 12";
        let sample = parse_sample(line).unwrap();
        assert_eq!(sample.identity, "push_time_seconds{job=\"a b}\"}");
        assert_eq!(sample.timestamp, 12.0);
    }

    #[test]
    fn test_parse_sample_rejects_bad_timestamp() {
        assert_eq!(
            parse_sample("push_time_seconds{job=\"a\"} soon"),
            Err(SampleError::InvalidTimestamp("soon".into()))
        );
        assert_eq!(
            parse_sample("push_time_seconds{job=\"a\"} NaN"),
            Err(SampleError::InvalidTimestamp("NaN".into()))
        );
        assert_eq!(
            parse_sample("push_time_seconds{job=\"a\"}"),
            Err(SampleError::MissingTimestamp)
        );
        assert_eq!(
            parse_sample("push_time_seconds{job=\"a\" 5"),
            Err(SampleError::UnterminatedLabels)
        );
    }

    #[test]
    fn test_parse_labels_in_order() {
        let labels = parse_labels(
            "push_time_seconds{hostName=\"XXX\",instance=\"localhost:9091\",job=\"push_gateway\"}",
        )
        .unwrap();
        assert_eq!(
            labels.0,
            vec![
                ("hostName".to_string(), "XXX".to_string()),
                ("instance".to_string(), "localhost:9091".to_string()),
                ("job".to_string(), "push_gateway".to_string()),
            ]
        );
        assert_eq!(labels.job(), Some("push_gateway"));
    }

    #[test]
    fn test_parse_labels_quoted_commas_and_escapes() {
        let labels =
            parse_labels("push_time_seconds{job=\"a,b\",note=\"say \\\"hi\\\"\",}").unwrap();
        assert_eq!(labels.job(), Some("a,b"));
        assert_eq!(labels.0[1], ("note".to_string(), "say \"hi\"".to_string()));
        assert_eq!(labels.0.len(), 2);
    }

    #[test]
    fn test_parse_labels_malformed() {
        assert_eq!(
            parse_labels("push_time_seconds{job}"),
            Err(SampleError::MalformedLabel("job".into()))
        );
        assert_eq!(
            parse_labels("go_goroutines{job=\"a\"}"),
            Err(SampleError::UnterminatedLabels)
        );
    }
}
