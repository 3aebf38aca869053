use std::collections::BTreeSet;

use ariadne::{Color, Fmt, Label, Report, ReportKind};

use crate::ast::{Item, SchemaFile, TypeRef};
use crate::spanned::Spanned;
use crate::Diagnostics;

fn references(item: &Item) -> Vec<Spanned<&str>> {
    let mut refs = Vec::new();
    match item {
        Item::Struct(s) => {
            for field in &s.fields {
                TypeRef::named_refs(&field.val.ty, &mut refs);
            }
        }
        Item::Sealed(s) => {
            for (_, ty) in &s.subtypes {
                TypeRef::named_refs(ty, &mut refs);
            }
            if let Some(default) = &s.default {
                refs.push(Spanned::new(default.val.as_str(), default.span));
            }
        }
        Item::Enum(_) => {}
    }
    refs
}

/// Items that can not be reached from the root shape.
pub fn lint_unused_shapes<'d>(
    file: &SchemaFile,
    root: &str,
    path: &'d String,
    diag: &mut Diagnostics<'d>,
) {
    let mut reachable = BTreeSet::new();
    let mut pending = vec![root];
    while let Some(name) = pending.pop() {
        if !reachable.insert(name) {
            continue;
        }
        if let Some(item) = file.find(name) {
            pending.extend(references(item).into_iter().map(|r| r.val));
        }
    }

    for name in file.names() {
        if reachable.contains(name.val.as_str()) {
            continue;
        }
        diag.push(
            Report::build(ReportKind::Warning, path, name.span.start)
                .with_message(format!(
                    "shape \"{}\" is defined but never used by \"{}\"",
                    name.val.as_str().fg(Color::Blue),
                    root.fg(Color::Blue)
                ))
                .with_label(
                    Label::new((path, name.span.into_range()))
                        .with_color(Color::Yellow)
                        .with_message(format!("\"{}\" is defined here", name.val.as_str().fg(Color::Blue))),
                )
                .finish(),
        );
    }
}
