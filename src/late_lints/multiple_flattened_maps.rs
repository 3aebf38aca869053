use ariadne::{Color, Fmt, Label, Report, ReportKind};

use crate::ast::{SchemaFile, TypeKind};
use crate::Diagnostics;

use super::{flatten_roots, walk_flattened};

/// A flattening scope can hand its unknown keys to at most one map.
pub fn lint_multiple_flattened_maps<'d>(
    file: &SchemaFile,
    path: &'d String,
    diag: &mut Diagnostics<'d>,
) {
    for root in flatten_roots(file) {
        let mut maps = Vec::new();
        walk_flattened(file, root, |owner, field| {
            if field.val.flatten().is_some() && matches!(field.val.ty.val.kind, TypeKind::Map(..)) {
                maps.push((owner, field));
            }
        });
        if maps.len() < 2 {
            continue;
        }

        let mut report = Report::build(ReportKind::Error, path, root.name.span.start)
            .with_message(format!(
                "\"{}\" flattens {} maps, but only one map can be flattened",
                root.name.val.as_str().fg(Color::Blue),
                maps.len()
            ))
            .with_label(Label::new((path, root.name.span.into_range())).with_color(Color::Red));
        for (owner, field) in maps {
            report.add_label(
                Label::new((path, field.span.into_range()))
                    .with_color(Color::Blue)
                    .with_message(format!(
                        "map flattened by \"{}\"",
                        owner.name.val.as_str().fg(Color::Blue)
                    )),
            );
        }
        diag.push(report.finish());
    }
}
