#![forbid(unsafe_code)]

use std::collections::HashMap;

use asl_ast::{Binop, Expr, Field, FunSig, Ident, Loc, Ty, Unop};

/// Suffix markers distinguishing getter/setter namespaces from plain
/// functions. Applied to the declared name when registering.
pub const GETTER_SUFFIX: &str = "__getter";
pub const SETTER_SUFFIX: &str = "__setter";

#[derive(Clone, Debug)]
pub struct VarInfo {
    pub name: Ident,
    pub loc: Loc,
    pub ty: Ty,
    pub is_local: bool,
    pub is_constant: bool,
}

#[derive(Clone, Debug)]
pub enum TypeDef {
    Builtin,
    Forward,
    Alias { params: Vec<Ident>, ty: Ty },
    Record { params: Vec<Ident>, fields: Vec<Field> },
    Exception { fields: Vec<Field> },
    Enum { members: Vec<Ident> },
}

/// The session-wide global environment. Appended to as declarations are
/// checked, never mutated behind the pipeline's back.
#[derive(Default)]
pub struct GlobalEnv {
    pub types: HashMap<String, TypeDef>,
    /// Function candidates by base name. Each entry's `sig.name` carries
    /// the disambiguation tag assigned at registration.
    pub funs: HashMap<String, Vec<FunSig>>,
    pub operators1: HashMap<Unop, Vec<Ident>>,
    pub operators2: HashMap<Binop, Vec<Ident>>,
    pub globals: HashMap<String, VarInfo>,
    /// Known constant initialisers, used by constant propagation and the
    /// entailment assumptions.
    pub consts: HashMap<String, Expr>,
    /// Enumeration member -> owning enumeration type.
    pub enum_members: HashMap<String, Ident>,
    /// Exception declaration order, for the emitted tagged union.
    pub exceptions: Vec<Ident>,
    next_tag: u32,
}

impl GlobalEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_tag(&mut self) -> u32 {
        self.next_tag += 1;
        self.next_tag
    }

    pub fn add_fun(&mut self, sig: FunSig) -> Ident {
        let tagged = if sig.name.tag() == 0 {
            let tag = self.fresh_tag();
            sig.name.with_tag(tag)
        } else {
            sig.name.clone()
        };
        let mut sig = sig;
        sig.name = tagged.clone();
        self.funs
            .entry(tagged.name().to_string())
            .or_default()
            .push(sig);
        tagged
    }

    pub fn candidates(&self, base: &str) -> &[FunSig] {
        self.funs.get(base).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The unique signature carrying this exact tagged identifier.
    pub fn fun_by_ident(&self, name: &Ident) -> Option<&FunSig> {
        self.funs
            .get(name.name())
            .and_then(|cands| cands.iter().find(|s| s.name == *name))
    }

    pub fn is_enum_type(&self, name: &str) -> bool {
        matches!(self.types.get(name), Some(TypeDef::Enum { .. }))
    }

    pub fn enum_members_of(&self, name: &str) -> Option<&[Ident]> {
        match self.types.get(name) {
            Some(TypeDef::Enum { members }) => Some(members),
            _ => None,
        }
    }

    pub fn exception_fields(&self, name: &str) -> Option<&[Field]> {
        match self.types.get(name) {
            Some(TypeDef::Exception { fields }) => Some(fields),
            _ => None,
        }
    }

    pub fn record_def(&self, name: &str) -> Option<(&[Ident], &[Field])> {
        match self.types.get(name) {
            Some(TypeDef::Record { params, fields }) => {
                Some((params.as_slice(), fields.as_slice()))
            }
            _ => None,
        }
    }
}

/// The lexical scope stack of the typechecker. Global scope lives in
/// [`GlobalEnv`]; this tracks function-local bindings only.
#[derive(Default)]
pub struct Scopes {
    stack: Vec<HashMap<String, VarInfo>>,
}

impl Scopes {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn push(&mut self) {
        self.stack.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn declare(&mut self, info: VarInfo) -> Result<(), VarInfo> {
        let top = self
            .stack
            .last_mut()
            .expect("declare outside any scope");
        match top.get(info.name.name()) {
            Some(existing) => Err(existing.clone()),
            None => {
                top.insert(info.name.name().to_string(), info);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&VarInfo> {
        self.stack.iter().rev().find_map(|scope| scope.get(name))
    }
}
