//! Syntax tree of a schema file.
//!
//! ```text
//! // Comments run to the end of the line.
//! struct Outer { a: int, #[flatten] b: Inner, #[alias("x")] c?: string, d: int? }
//! enum Color { Red, Green }
//! sealed Animal discriminator "kind" default Cat { cat: Cat, dog: Dog }
//! ```

use crate::spanned::Spanned;

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaFile {
    pub items: Vec<Spanned<Item>>,
}

impl SchemaFile {
    pub fn name_of(item: &Item) -> &Spanned<String> {
        match item {
            Item::Struct(s) => &s.name,
            Item::Enum(e) => &e.name,
            Item::Sealed(s) => &s.name,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &Spanned<String>> {
        self.items.iter().map(|item| Self::name_of(&item.val))
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
        self.items.iter().filter_map(|item| match &item.val {
            Item::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn find(&self, name: &str) -> Option<&Item> {
        self.items
            .iter()
            .map(|item| &item.val)
            .find(|item| Self::name_of(item).val == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Struct(StructDef),
    Enum(EnumDef),
    Sealed(SealedDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: Spanned<String>,
    pub fields: Vec<Spanned<FieldDef>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub attrs: Vec<Spanned<Attr>>,
    pub name: Spanned<String>,
    /// Written `name?: T`.
    pub optional: bool,
    pub ty: Spanned<TypeRef>,
}

impl FieldDef {
    pub fn flatten(&self) -> Option<&Spanned<Attr>> {
        self.attrs.iter().find(|a| a.val == Attr::Flatten)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().filter_map(|a| match &a.val {
            Attr::Alias(name) => Some(name.as_str()),
            Attr::Flatten => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    Flatten,
    Alias(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub kind: TypeKind,
    /// Written `T?`.
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// A scalar keyword or the name of an item.
    Named(String),
    List(Box<Spanned<TypeRef>>),
    Map(Box<Spanned<TypeRef>>, Box<Spanned<TypeRef>>),
}

impl TypeRef {
    /// Every named reference in this type, including those inside lists and maps.
    pub fn named_refs<'t>(this: &'t Spanned<TypeRef>, out: &mut Vec<Spanned<&'t str>>) {
        match &this.val.kind {
            TypeKind::Named(name) => out.push(Spanned::new(name.as_str(), this.span)),
            TypeKind::List(item) => Self::named_refs(item, out),
            TypeKind::Map(key, value) => {
                Self::named_refs(key, out);
                Self::named_refs(value, out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: Spanned<String>,
    pub variants: Vec<Spanned<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SealedDef {
    pub name: Spanned<String>,
    pub discriminator: Option<Spanned<String>>,
    pub default: Option<Spanned<String>>,
    /// Tag and subtype, in declaration order.
    pub subtypes: Vec<(Spanned<String>, Spanned<TypeRef>)>,
}
