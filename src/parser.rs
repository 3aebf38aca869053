//! Parser for schema files.

use chumsky::prelude::*;

use crate::ast::{Attr, EnumDef, FieldDef, Item, SchemaFile, SealedDef, StructDef, TypeKind, TypeRef};
use crate::spanned::Spanned;

type Extra<'a> = extra::Err<Rich<'a, char>>;

/// Whitespace and `//` line comments.
fn ws<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    let comment = just("//").then(none_of("\n").repeated()).ignored();
    any()
        .filter(|c: &char| c.is_whitespace())
        .ignored()
        .or(comment)
        .repeated()
        .ignored()
}

fn token<'a>(t: &'static str) -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    just(t).ignored().padded_by(ws())
}

fn raw_ident<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                .repeated(),
        )
        .to_slice()
}

fn keyword<'a>(word: &'static str) -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    raw_ident()
        .filter(move |s: &&str| *s == word)
        .ignored()
        .labelled(word)
        .padded_by(ws())
}

fn ident<'a>() -> impl Parser<'a, &'a str, Spanned<String>, Extra<'a>> + Clone {
    raw_ident()
        .map_with(|name: &str, e| Spanned::new(name.to_string(), e.span()))
        .labelled("identifier")
}

/// A double-quoted string without escapes.
fn string<'a>() -> impl Parser<'a, &'a str, Spanned<String>, Extra<'a>> + Clone {
    none_of("\"\n")
        .repeated()
        .to_slice()
        .map(ToString::to_string)
        .delimited_by(just('"'), just('"'))
        .map_with(|val, e| Spanned::new(val, e.span()))
        .labelled("string")
}

fn type_ref<'a>() -> impl Parser<'a, &'a str, Spanned<TypeRef>, Extra<'a>> + Clone {
    recursive(|ty| {
        let list = ty
            .clone()
            .delimited_by(token("["), token("]"))
            .map(|item| TypeKind::List(Box::new(item)))
            .labelled("list type");

        let map = ty
            .clone()
            .then_ignore(token(":"))
            .then(ty)
            .delimited_by(token("{"), token("}"))
            .map(|(key, value)| TypeKind::Map(Box::new(key), Box::new(value)))
            .labelled("map type");

        let named = ident().map(|name| TypeKind::Named(name.val));

        choice((list, map, named))
            .then(just('?').or_not())
            .map_with(|(kind, nullable), e| {
                Spanned::new(
                    TypeRef {
                        kind,
                        nullable: nullable.is_some(),
                    },
                    e.span(),
                )
            })
            .boxed()
    })
    .labelled("type")
}

fn attr<'a>() -> impl Parser<'a, &'a str, Spanned<Attr>, Extra<'a>> + Clone {
    let flatten = raw_ident()
        .filter(|s: &&str| *s == "flatten")
        .to(Attr::Flatten);
    let alias = raw_ident()
        .filter(|s: &&str| *s == "alias")
        .ignore_then(string().delimited_by(token("("), token(")")))
        .map(|name| Attr::Alias(name.val));

    choice((flatten, alias))
        .map_with(|val, e| Spanned::new(val, e.span()))
        .delimited_by(token("#["), token("]"))
        .labelled("attribute")
}

fn field<'a>() -> impl Parser<'a, &'a str, Spanned<FieldDef>, Extra<'a>> + Clone {
    attr()
        .repeated()
        .collect::<Vec<_>>()
        .then(ident())
        .then(just('?').or_not())
        .then_ignore(token(":"))
        .then(type_ref())
        .map_with(|(((attrs, name), optional), ty), e| {
            Spanned::new(
                FieldDef {
                    attrs,
                    name,
                    optional: optional.is_some(),
                    ty,
                },
                e.span(),
            )
        })
        .labelled("field")
}

fn struct_def<'a>() -> impl Parser<'a, &'a str, Item, Extra<'a>> + Clone {
    keyword("struct")
        .ignore_then(ident())
        .then(
            field()
                .padded_by(ws())
                .separated_by(token(","))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(token("{"), token("}")),
        )
        .map(|(name, fields)| Item::Struct(StructDef { name, fields }))
}

fn enum_def<'a>() -> impl Parser<'a, &'a str, Item, Extra<'a>> + Clone {
    keyword("enum")
        .ignore_then(ident())
        .then(
            ident()
                .padded_by(ws())
                .separated_by(token(","))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(token("{"), token("}")),
        )
        .map(|(name, variants)| Item::Enum(EnumDef { name, variants }))
}

fn sealed_def<'a>() -> impl Parser<'a, &'a str, Item, Extra<'a>> + Clone {
    let subtype = ident()
        .or(string())
        .then_ignore(token(":"))
        .then(type_ref())
        .padded_by(ws());

    keyword("sealed")
        .ignore_then(ident())
        .then(keyword("discriminator").ignore_then(string()).or_not())
        .then(keyword("default").ignore_then(ident()).or_not())
        .then(
            subtype
                .separated_by(token(","))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(token("{"), token("}")),
        )
        .map(|(((name, discriminator), default), subtypes)| {
            Item::Sealed(SealedDef {
                name,
                discriminator,
                default,
                subtypes,
            })
        })
}

pub fn parser<'a>() -> impl Parser<'a, &'a str, SchemaFile, Extra<'a>> {
    choice((struct_def(), enum_def(), sealed_def()))
        .map_with(|item, e| Spanned::new(item, e.span()))
        .padded_by(ws())
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map(|items| SchemaFile { items })
        .labelled("schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> SchemaFile {
        let (file, errors) = parser().parse(src).into_output_errors();
        assert!(errors.is_empty(), "{errors:?}");
        file.unwrap()
    }

    #[test]
    fn struct_with_attributes() {
        let file = parse(
            r#"
            // Outer keeps `b` flattened.
            struct Outer {
                a: int,
                #[flatten] b: Inner,
                #[alias("x")] c?: string,
                d: [int?]?,
                e: {string: Inner},
            }
            "#,
        );
        let [Spanned {
            val: Item::Struct(s),
            ..
        }] = file.items.as_slice()
        else {
            panic!("expected one struct, got {:?}", file.items);
        };
        assert_eq!(s.name.val, "Outer");
        let names: Vec<_> = s.fields.iter().map(|f| f.val.name.val.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d", "e"]);

        let b = &s.fields[1].val;
        assert!(b.flatten().is_some());
        let c = &s.fields[2].val;
        assert!(c.optional);
        assert_eq!(c.aliases().collect::<Vec<_>>(), ["x"]);

        let d = &s.fields[3].val.ty.val;
        assert!(d.nullable);
        let TypeKind::List(item) = &d.kind else {
            panic!("expected a list, got {d:?}");
        };
        assert!(item.val.nullable);
        assert!(matches!(s.fields[4].val.ty.val.kind, TypeKind::Map(..)));
    }

    #[test]
    fn enums_and_sealed_shapes() {
        let file = parse(
            r#"
            enum Color { Red, Green, }
            sealed Animal discriminator "kind" default Cat { cat: Cat, "big-dog": Dog }
            "#,
        );
        assert_eq!(file.items.len(), 2);
        let Item::Sealed(sealed) = &file.items[1].val else {
            panic!("expected a sealed shape");
        };
        assert_eq!(sealed.discriminator.as_ref().map(|d| d.val.as_str()), Some("kind"));
        assert_eq!(sealed.default.as_ref().map(|d| d.val.as_str()), Some("Cat"));
        let tags: Vec<_> = sealed.subtypes.iter().map(|(t, _)| t.val.as_str()).collect();
        assert_eq!(tags, ["cat", "big-dog"]);
    }

    #[test]
    fn spans_point_at_names() {
        let src = "struct A { value: Missing }";
        let file = parse(src);
        let s = file.structs().next().unwrap();
        let ty = &s.fields[0].val.ty;
        assert_eq!(&src[ty.span.into_range()], "Missing");
        assert_eq!(&src[s.name.span.into_range()], "A");
    }

    #[test]
    fn syntax_errors_are_reported() {
        let (_, errors) = parser()
            .parse("struct A { a int }")
            .into_output_errors();
        assert!(!errors.is_empty());
    }
}
