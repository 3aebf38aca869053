mod duplicate_names;
mod flatten_cycles;
mod multiple_flattened_maps;
mod non_flattenable;
mod undefined_shapes;
mod unused_shapes;

pub(crate) use duplicate_names::*;
pub(crate) use flatten_cycles::*;
pub(crate) use multiple_flattened_maps::*;
pub(crate) use non_flattenable::*;
pub(crate) use undefined_shapes::*;
pub(crate) use unused_shapes::*;

use crate::ast::{FieldDef, Item, SchemaFile, StructDef, TypeKind};
use crate::spanned::Spanned;

/// Name of the struct a flattened field points at, if it points at a struct at all.
pub(crate) fn flattened_struct<'f>(file: &'f SchemaFile, field: &FieldDef) -> Option<&'f StructDef> {
    field.flatten()?;
    let TypeKind::Named(name) = &field.ty.val.kind else {
        return None;
    };
    match file.find(name)? {
        Item::Struct(s) => Some(s),
        _ => None,
    }
}

/// Structs that no other struct flattens. Every flattening scope starts at one of them.
pub(crate) fn flatten_roots(file: &SchemaFile) -> impl Iterator<Item = &StructDef> {
    file.structs().filter(move |candidate| {
        !file.structs().any(|s| {
            s.fields.iter().any(|f| {
                flattened_struct(file, &f.val).is_some_and(|t| t.name.val == candidate.name.val)
            })
        })
    })
}

/// Visits the fields of `root` and, depth first, the fields of everything it flattens. Each
/// struct is visited once.
pub(crate) fn walk_flattened<'f>(
    file: &'f SchemaFile,
    root: &'f StructDef,
    mut visit: impl FnMut(&'f StructDef, &'f Spanned<FieldDef>),
) {
    let mut seen = vec![root.name.val.as_str()];
    let mut stack = vec![root];
    while let Some(s) = stack.pop() {
        for field in &s.fields {
            visit(s, field);
            if let Some(target) = flattened_struct(file, &field.val) {
                if !seen.contains(&target.name.val.as_str()) {
                    seen.push(target.name.val.as_str());
                    stack.push(target);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chumsky::Parser;

    use crate::ast::SchemaFile;
    use crate::parser::parser;

    pub fn parse(src: &str) -> SchemaFile {
        let (file, errors) = parser().parse(src).into_output_errors();
        assert!(errors.is_empty(), "{errors:?}");
        file.unwrap()
    }

    pub fn path() -> String {
        "schema.fj".to_string()
    }
}
