use ariadne::{Color, Fmt, Label, Report, ReportKind};

use crate::ast::{Item, SchemaFile, TypeKind};
use crate::lower::scalar_kind;
use crate::Diagnostics;

/// `#[flatten]` on anything but a struct or a map.
pub fn lint_non_flattenable<'d>(file: &SchemaFile, path: &'d String, diag: &mut Diagnostics<'d>) {
    for s in file.structs() {
        for field in &s.fields {
            let field = &field.val;
            let Some(attr) = field.flatten() else {
                continue;
            };
            let ty = &field.ty;
            let what = match &ty.val.kind {
                TypeKind::Map(..) => continue,
                TypeKind::List(_) => "a list",
                TypeKind::Named(name) if scalar_kind(name).is_some() => "a builtin type",
                TypeKind::Named(name) => match file.find(name) {
                    Some(Item::Struct(_)) | None => continue,
                    Some(Item::Enum(_)) => "an enum",
                    Some(Item::Sealed(_)) => "a sealed shape",
                },
            };

            diag.push(
                Report::build(ReportKind::Error, path, attr.span.start)
                    .with_message(format!(
                        "\"{}.{}\" can not be flattened",
                        s.name.val.as_str().fg(Color::Blue),
                        field.name.val.as_str().fg(Color::Blue)
                    ))
                    .with_label(
                        Label::new((path, attr.span.into_range()))
                            .with_color(Color::Red)
                            .with_message("flattened here"),
                    )
                    .with_label(
                        Label::new((path, ty.span.into_range()))
                            .with_color(Color::Blue)
                            .with_message(format!("this is {what}")),
                    )
                    .with_help("only structs and maps can be flattened")
                    .finish(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::late_lints::test_support::*;

    #[test]
    fn only_structs_and_maps() {
        let file = parse(
            r#"
            struct A {
                #[flatten] ok: B,
                #[flatten] extra: {string: int},
                #[flatten] list: [B],
                #[flatten] n: int,
                #[flatten] e: E,
                #[flatten] s: S,
            }
            struct B { x: int }
            enum E { X }
            sealed S { b: B }
            "#,
        );
        let path = path();
        let mut diag = Vec::new();
        lint_non_flattenable(&file, &path, &mut diag);
        assert_eq!(diag.len(), 4);
    }
}
