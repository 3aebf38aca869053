use ariadne::{Color, Fmt, Label, Report, ReportKind};
use flatjson_core::ScalarKind;

use crate::ast::{Item, SchemaFile, TypeRef};
use crate::edit_distance;
use crate::lower::scalar_kind;
use crate::spanned::Spanned;
use crate::Diagnostics;

/// References to names that are neither a builtin type nor an item of the file.
pub fn lint_undefined_shapes<'d>(file: &SchemaFile, path: &'d String, diag: &mut Diagnostics<'d>) {
    let mut refs: Vec<Spanned<&str>> = Vec::new();
    for item in &file.items {
        match &item.val {
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
    }

    let mut candidates: Vec<&str> = ScalarKind::ALL.iter().map(|k| k.name()).collect();
    candidates.extend(file.names().map(|n| n.val.as_str()));

    for r in refs {
        if scalar_kind(r.val).is_some() || file.find(r.val).is_some() {
            continue;
        }
        let mut report = Report::build(ReportKind::Error, path, r.span.start)
            .with_message(format!(
                "attempt to reference undefined shape \"{}\"",
                r.val.fg(Color::Blue)
            ))
            .with_label(
                Label::new((path, r.span.into_range()))
                    .with_color(Color::Red)
                    .with_message("not defined in this schema"),
            );
        if let Some(suggestion) = edit_distance::find_best_match_for_name(&candidates, r.val, Some(3))
        {
            report.set_help(format!("did you mean {} instead?", suggestion.fg(Color::Blue)));
        }
        diag.push(report.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::late_lints::test_support::*;

    #[test]
    fn reports_each_undefined_reference() {
        let file = parse(
            r#"
            struct A { b: Bee, c: [Missing], d: {string: Bee?}, e: strin }
            struct B { a: A }
            sealed S default Nope { a: A }
            "#,
        );
        let path = path();
        let mut diag = Vec::new();
        lint_undefined_shapes(&file, &path, &mut diag);
        assert_eq!(diag.len(), 5);
    }

    #[test]
    fn builtins_and_items_resolve() {
        let file = parse("struct A { b: B, n: uint? } enum B { X }");
        let path = path();
        let mut diag = Vec::new();
        lint_undefined_shapes(&file, &path, &mut diag);
        assert!(diag.is_empty());
    }
}
