//! Prometheus text exposition writer.
//!
//! Every sample is preceded by its own `# HELP` and `# TYPE` lines:
//!
//! ```text
//! # HELP x h
//! # TYPE x gauge
//! x{a="1"} 3.500000 1000
//! ```

use std::borrow::Cow;
use std::io::{self, Write};

use crate::metric::Sample;

/// Content type of the exposition output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Write one sample, with its HELP and TYPE lines, to `out`.
///
/// Row labels are written before the descriptor's extra labels; braces are
/// omitted when there are none. The timestamp must already be in
/// milliseconds.
pub fn write_sample<W: Write + ?Sized>(out: &mut W, sample: &Sample<'_>) -> io::Result<()> {
    let metric = sample.metric;
    writeln!(out, "# HELP {} {}", metric.name, escape_help(&metric.help))?;
    writeln!(out, "# TYPE {} {}", metric.name, metric.metric_type)?;
    out.write_all(metric.name.as_bytes())?;

    if metric.has_labels(&sample.labels) {
        out.write_all(b"{")?;
        let labels = sample.labels.iter().chain(&metric.extra_labels);
        for (i, (name, value)) in labels.enumerate() {
            if i > 0 {
                out.write_all(b",")?;
            }
            write!(out, "{name}=\"{}\"", escape_label_value(value))?;
        }
        out.write_all(b"}")?;
    }

    writeln!(out, " {} {}", format_value(sample.value), sample.timestamp_ms)
}

/// Fixed point with six decimals; non-finite values use the exposition
/// spellings.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value:.6}")
    }
}

fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

fn escape_help(help: &str) -> Cow<'_, str> {
    if !help.contains(['\\', '\n']) {
        return Cow::Borrowed(help);
    }
    Cow::Owned(help.replace('\\', "\\\\").replace('\n', "\\n"))
}
