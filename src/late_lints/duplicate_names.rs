use std::collections::BTreeMap;

use ariadne::{Color, Fmt, Label, Report, ReportKind};
use chumsky::span::SimpleSpan;

use crate::ast::{Item, SchemaFile};
use crate::lower::scalar_kind;
use crate::spanned::Spanned;
use crate::Diagnostics;

use super::{flatten_roots, walk_flattened};

fn report_duplicate<'d>(
    path: &'d String,
    diag: &mut Diagnostics<'d>,
    message: String,
    first: SimpleSpan,
    again: SimpleSpan,
) {
    diag.push(
        Report::build(ReportKind::Error, path, again.start)
            .with_message(message)
            .with_label(
                Label::new((path, first.into_range()))
                    .with_color(Color::Blue)
                    .with_message("first used here"),
            )
            .with_label(
                Label::new((path, again.into_range()))
                    .with_color(Color::Red)
                    .with_message("used again here"),
            )
            .finish(),
    );
}

/// Reports every name in `names` that was already seen.
fn check_unique<'d, 'f>(
    path: &'d String,
    diag: &mut Diagnostics<'d>,
    names: impl IntoIterator<Item = Spanned<&'f str>>,
    message: impl Fn(&str) -> String,
) {
    let mut seen: BTreeMap<&str, SimpleSpan> = BTreeMap::new();
    for name in names {
        match seen.get(name.val) {
            Some(first) => report_duplicate(path, diag, message(name.val), *first, name.span),
            None => {
                seen.insert(name.val, name.span);
            }
        }
    }
}

/// Shapes defined twice, shapes shadowing a builtin type, repeated enum entries and subtype
/// tags, and wire names that collide within one flattening scope.
pub fn lint_duplicate_names<'d>(file: &SchemaFile, path: &'d String, diag: &mut Diagnostics<'d>) {
    for name in file.names() {
        if scalar_kind(&name.val).is_some() {
            diag.push(
                Report::build(ReportKind::Error, path, name.span.start)
                    .with_message(format!(
                        "\"{}\" is a builtin type and can not be redefined",
                        name.val.as_str().fg(Color::Blue)
                    ))
                    .with_label(Label::new((path, name.span.into_range())).with_color(Color::Red))
                    .finish(),
            );
        }
    }
    check_unique(
        path,
        diag,
        file.names().map(|n| Spanned::new(n.val.as_str(), n.span)),
        |name| format!("shape \"{}\" is defined more than once", name.fg(Color::Blue)),
    );

    for item in &file.items {
        match &item.val {
            Item::Enum(e) => check_unique(
                path,
                diag,
                e.variants.iter().map(|v| Spanned::new(v.val.as_str(), v.span)),
                |name| {
                    format!(
                        "entry \"{}\" appears twice in enum \"{}\"",
                        name.fg(Color::Blue),
                        e.name.val
                    )
                },
            ),
            Item::Sealed(s) => check_unique(
                path,
                diag,
                s.subtypes
                    .iter()
                    .map(|(tag, _)| Spanned::new(tag.val.as_str(), tag.span)),
                |name| {
                    format!(
                        "subtype tag \"{}\" appears twice in \"{}\"",
                        name.fg(Color::Blue),
                        s.name.val
                    )
                },
            ),
            Item::Struct(_) => {}
        }
    }

    for root in flatten_roots(file) {
        let mut names = Vec::new();
        walk_flattened(file, root, |_, field| {
            let field = &field.val;
            if field.flatten().is_some() {
                return;
            }
            names.push(Spanned::new(field.name.val.as_str(), field.name.span));
            for attr in &field.attrs {
                if let crate::ast::Attr::Alias(alias) = &attr.val {
                    names.push(Spanned::new(alias.as_str(), attr.span));
                }
            }
        });
        check_unique(path, diag, names, |name| {
            format!(
                "element with name \"{}\" appears twice in \"{}\"",
                name.fg(Color::Blue),
                root.name.val
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::late_lints::test_support::*;

    fn lint(src: &str) -> usize {
        let file = parse(src);
        let path = path();
        let mut diag = Vec::new();
        lint_duplicate_names(&file, &path, &mut diag);
        diag.len()
    }

    #[test]
    fn clean_schema() {
        assert_eq!(
            lint("struct A { a: int, #[flatten] b: B } struct B { c: int } enum E { X, Y }"),
            0
        );
    }

    #[test]
    fn collisions_through_flattening() {
        assert_eq!(lint("struct A { a: int, #[flatten] b: B } struct B { a: int }"), 1);
        assert_eq!(lint(r#"struct A { #[alias("a")] x: int, a: int }"#), 1);
    }

    #[test]
    fn items_variants_and_tags() {
        assert_eq!(lint("struct int { a: int }"), 1);
        assert_eq!(lint("enum E { X } enum E { Y }"), 1);
        assert_eq!(lint("enum E { X, X }"), 1);
        assert_eq!(lint("struct A { a: int } sealed S { a: A, a: A }"), 1);
    }
}
