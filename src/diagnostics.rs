//! Decode errors as source reports.

use ariadne::{Color, Fmt, Label, Report, ReportKind};
use flatjson_core::{Codec, DecodeError, DecodeErrorKind};

use crate::edit_distance;
use crate::DiagnosticReport;

/// Renders `err` against the input document it was raised for.
///
/// Unknown keys get a suggestion from the names of the shape the key was looked up in, which
/// include the names of everything that shape flattens.
pub fn decode_error_report<'a>(
    err: &DecodeError,
    codec: &Codec,
    path: &'a String,
    src_len: usize,
) -> DiagnosticReport<'a> {
    let range = err.span.map(|span| {
        let range = span.into_range();
        let start = range.start.min(src_len);
        let end = range.end.max(start + 1).min(src_len.max(start));
        start..end
    });

    let mut report = Report::build(ReportKind::Error, path, range.clone().map_or(0, |r| r.start))
        .with_message(err.kind.to_string());
    if let Some(range) = range {
        let message = match &err.path {
            Some(logical) => format!("while decoding {}", logical.as_str().fg(Color::Blue)),
            None => "here".to_string(),
        };
        report.add_label(
            Label::new((path, range))
                .with_color(Color::Red)
                .with_message(message),
        );
    } else if let Some(logical) = &err.path {
        report.set_note(format!("while decoding {}", logical.as_str().fg(Color::Blue)));
    }

    if let Some(suggestion) = suggest_key(err, codec) {
        report.set_help(format!("did you mean {} instead?", suggestion.fg(Color::Blue)));
    }

    report.finish()
}

fn suggest_key(err: &DecodeError, codec: &Codec) -> Option<String> {
    let DecodeErrorKind::UnknownKey { key, shape } = &err.kind else {
        return None;
    };
    let descriptor = codec.descriptor(*shape).ok()?;
    let known: Vec<&str> = descriptor.known_names().collect();
    edit_distance::find_best_match_for_name(&known, key, Some(3)).map(str::to_string)
}
