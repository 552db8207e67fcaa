//! Type model for MxLang
//!
//! A closed set of type variants. Class names and members live in a
//! `ClassTable`; a `Type::Class` only carries the identity of its class.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::utils::{EntityKind, LookupError};

/// Index of a class in the `ClassTable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

/// A type in the MxLang type model
#[derive(Debug, Clone)]
pub enum Type {
    Int,
    Bool,
    String,
    Null,
    Void,
    Class { id: ClassId, name: Rc<str> },
    Array(Box<Type>),
    Function { ret: Box<Type>, params: Vec<Type> },
    /// Produced after an error; compares equal to nothing
    Unknown,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Int, Type::Int)
            | (Type::Bool, Type::Bool)
            | (Type::String, Type::String)
            | (Type::Null, Type::Null)
            | (Type::Void, Type::Void) => true,
            (Type::Class { id: a, .. }, Type::Class { id: b, .. }) => a == b,
            (Type::Array(a), Type::Array(b)) => a == b,
            (
                Type::Function { ret: ra, params: pa },
                Type::Function { ret: rb, params: pb },
            ) => ra == rb && pa == pb,
            _ => false,
        }
    }
}

impl Type {
    pub fn array_of(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    /// `elem` wrapped in `dims` array levels
    pub fn array_with_dims(elem: Type, dims: usize) -> Type {
        (0..dims).fold(elem, |ty, _| Type::array_of(ty))
    }

    pub fn function(ret: Type, params: Vec<Type>) -> Type {
        Type::Function { ret: Box::new(ret), params }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Class and array values are references that may hold `null`
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Class { .. } | Type::Array(_))
    }

    /// True when this type or any nested type is `Unknown`
    pub fn contains_unknown(&self) -> bool {
        match self {
            Type::Unknown => true,
            Type::Array(elem) => elem.contains_unknown(),
            Type::Function { ret, params } => {
                ret.contains_unknown() || params.iter().any(Type::contains_unknown)
            }
            _ => false,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Whether a value of type `value` may be stored into a location of this type
    ///
    /// `Unknown` on either side is accepted so one bad expression produces
    /// one diagnostic.
    pub fn is_assignable_from(&self, value: &Type) -> bool {
        if self.is_unknown() || value.is_unknown() {
            return true;
        }
        match value {
            Type::Null => self.is_nullable() || matches!(self, Type::Null),
            _ => self == value,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::Null => write!(f, "null"),
            Type::Void => write!(f, "void"),
            Type::Class { name, .. } => write!(f, "{}", name),
            Type::Array(elem) => write!(f, "{}[]", elem),
            Type::Function { ret, params } => {
                write!(f, "{}(", ret)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
            Type::Unknown => write!(f, "<unknown>"),
        }
    }
}

// ==================== Classes ====================

/// Built-in methods of `string`: name, parameters, return type
pub const STRING_METHODS: &[(&str, &[Type], Type)] = &[
    ("length", &[], Type::Int),
    ("substring", &[Type::Int, Type::Int], Type::String),
    ("parseInt", &[], Type::Int),
    ("ord", &[Type::Int], Type::Int),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Field stored at this position of the object layout
    Field(usize),
    Method,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub ty: Type,
    pub kind: MemberKind,
}

/// Name and members of a declared class
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: Rc<str>,
    members: HashMap<String, Member>,
    field_order: Vec<String>,
    /// Constructor signature; every class ends up with one
    pub constructor: Option<Type>,
}

impl ClassInfo {
    pub fn ty(&self) -> Type {
        Type::Class { id: self.id, name: self.name.clone() }
    }

    pub fn add_field(&mut self, name: &str, ty: Type) -> Result<usize, LookupError> {
        let index = self.field_order.len();
        self.insert(name, Member { ty, kind: MemberKind::Field(index) }, EntityKind::Variable)?;
        self.field_order.push(name.to_string());
        Ok(index)
    }

    pub fn add_method(&mut self, name: &str, signature: Type) -> Result<(), LookupError> {
        self.insert(name, Member { ty: signature, kind: MemberKind::Method }, EntityKind::Function)
    }

    fn insert(&mut self, name: &str, member: Member, kind: EntityKind) -> Result<(), LookupError> {
        if self.members.contains_key(name) {
            return Err(LookupError::Duplicated { name: name.to_string(), kind });
        }
        self.members.insert(name.to_string(), member);
        Ok(())
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Fields in layout order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.field_order
            .iter()
            .filter_map(move |name| self.members.get(name).map(|m| (name.as_str(), &m.ty)))
    }
}

/// Arena of every class declared in a compilation unit
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: Vec<ClassInfo>,
    by_name: HashMap<String, ClassId>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str) -> Result<ClassId, LookupError> {
        if self.by_name.contains_key(name) {
            return Err(LookupError::Duplicated { name: name.to_string(), kind: EntityKind::Class });
        }
        let id = ClassId(self.classes.len());
        self.classes.push(ClassInfo {
            id,
            name: Rc::from(name),
            members: HashMap::new(),
            field_order: Vec::new(),
            constructor: None,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0]
    }

    pub fn get_mut(&mut self, id: ClassId) -> &mut ClassInfo {
        &mut self.classes[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter()
    }

    /// Type of member `name` of a value of type `ty`
    ///
    /// Classes expose their fields and methods, arrays expose `size()`,
    /// strings expose `STRING_METHODS`, every other type has no members.
    pub fn member_of(&self, ty: &Type, name: &str) -> Result<Member, LookupError> {
        let found = match ty {
            Type::Class { id, .. } => self.get(*id).member(name).cloned(),
            Type::Array(_) if name == "size" => Some(Member {
                ty: Type::function(Type::Int, Vec::new()),
                kind: MemberKind::Method,
            }),
            Type::String => STRING_METHODS
                .iter()
                .find(|(method, _, _)| *method == name)
                .map(|(_, params, ret)| Member {
                    ty: Type::function(ret.clone(), params.to_vec()),
                    kind: MemberKind::Method,
                }),
            _ => None,
        };
        found.ok_or_else(|| LookupError::NoMember { owner: ty.to_string(), name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_types(classes: &mut ClassTable) -> Vec<Type> {
        let point = classes.declare("Point").unwrap();
        let point = classes.get(point).ty();
        vec![
            Type::Int,
            Type::Bool,
            Type::String,
            Type::Null,
            Type::Void,
            point.clone(),
            Type::array_of(Type::Int),
            Type::array_with_dims(point, 2),
            Type::function(Type::Int, vec![Type::String]),
        ]
    }

    #[test]
    fn test_unknown_equals_nothing() {
        assert_ne!(Type::Unknown, Type::Unknown);
        assert_ne!(Type::Unknown, Type::Int);
        assert_ne!(Type::array_of(Type::Unknown), Type::array_of(Type::Unknown));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Type::array_of(Type::Int), Type::array_of(Type::Int));
        assert_ne!(Type::array_of(Type::Int), Type::array_with_dims(Type::Int, 2));
        assert_eq!(
            Type::function(Type::Void, vec![Type::Int, Type::Bool]),
            Type::function(Type::Void, vec![Type::Int, Type::Bool])
        );
        assert_ne!(
            Type::function(Type::Void, vec![Type::Int]),
            Type::function(Type::Int, vec![Type::Int])
        );
    }

    #[test]
    fn test_classes_compare_by_identity() {
        let mut classes = ClassTable::new();
        let a = classes.declare("A").unwrap();
        let b = classes.declare("B").unwrap();
        assert_eq!(classes.get(a).ty(), classes.get(a).ty());
        assert_ne!(classes.get(a).ty(), classes.get(b).ty());
    }

    #[test]
    fn test_assignability_is_reflexive() {
        let mut classes = ClassTable::new();
        for ty in sample_types(&mut classes) {
            assert!(ty.is_assignable_from(&ty), "{} should accept itself", ty);
        }
    }

    #[test]
    fn test_null_assignability() {
        let mut classes = ClassTable::new();
        for ty in sample_types(&mut classes) {
            let expected = matches!(ty, Type::Class { .. } | Type::Array(_) | Type::Null);
            assert_eq!(ty.is_assignable_from(&Type::Null), expected, "null into {}", ty);
        }
    }

    #[test]
    fn test_member_lookup() {
        let mut classes = ClassTable::new();
        let id = classes.declare("Node").unwrap();
        let node = classes.get(id).ty();
        assert_eq!(classes.get_mut(id).add_field("value", Type::Int), Ok(0));
        assert_eq!(classes.get_mut(id).add_field("next", node.clone()), Ok(1));
        classes
            .get_mut(id)
            .add_method("sum", Type::function(Type::Int, Vec::new()))
            .unwrap();

        let next = classes.member_of(&node, "next").unwrap();
        assert_eq!(next.ty, node);
        assert_eq!(next.kind, MemberKind::Field(1));
        assert_eq!(classes.member_of(&node, "sum").unwrap().kind, MemberKind::Method);
        assert_eq!(
            classes.member_of(&node, "missing").unwrap_err().to_string(),
            "unknown member \"missing\" of \"Node\""
        );

        let fields: Vec<&str> = classes.get(id).fields().map(|(name, _)| name).collect();
        assert_eq!(fields, vec!["value", "next"]);
    }

    #[test]
    fn test_primitives_have_no_members() {
        let classes = ClassTable::new();
        for ty in [Type::Int, Type::Bool, Type::Null, Type::Void] {
            assert!(classes.member_of(&ty, "length").is_err());
        }
        let size = classes.member_of(&Type::array_of(Type::Bool), "size").unwrap();
        assert_eq!(size.ty, Type::function(Type::Int, Vec::new()));
        assert!(classes.member_of(&Type::array_of(Type::Int), "length").is_err());
    }

    #[test]
    fn test_string_methods() {
        let classes = ClassTable::new();
        let member = |name: &str| classes.member_of(&Type::String, name).map(|m| (m.ty, m.kind));
        assert_eq!(
            member("length"),
            Ok((Type::function(Type::Int, Vec::new()), MemberKind::Method))
        );
        assert_eq!(
            member("substring").map(|(ty, _)| ty),
            Ok(Type::function(Type::String, vec![Type::Int, Type::Int]))
        );
        assert_eq!(member("parseInt").map(|(ty, _)| ty.to_string()), Ok("int()".to_string()));
        assert_eq!(member("ord").map(|(ty, _)| ty.to_string()), Ok("int(int)".to_string()));
        assert_eq!(
            classes.member_of(&Type::String, "size").unwrap_err().to_string(),
            "unknown member \"size\" of \"string\""
        );
    }

    #[test]
    fn test_duplicate_members() {
        let mut classes = ClassTable::new();
        let id = classes.declare("A").unwrap();
        classes.get_mut(id).add_field("x", Type::Int).unwrap();
        assert!(matches!(
            classes.get_mut(id).add_method("x", Type::function(Type::Void, Vec::new())),
            Err(LookupError::Duplicated { .. })
        ));
        assert!(matches!(classes.declare("A"), Err(LookupError::Duplicated { .. })));
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::array_with_dims(Type::String, 2).to_string(), "string[][]");
        assert_eq!(
            Type::function(Type::Int, vec![Type::Int, Type::Bool]).to_string(),
            "int(int, bool)"
        );
    }
}
