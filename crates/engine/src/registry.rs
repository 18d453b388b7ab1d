//! The global callable and type registry.
//!
//! The front-end populates one registry per translation unit: actions,
//! functions, controls, externs, tables, and struct type constructors,
//! all resolvable by bare name. The registry is shared read-only
//! (`Rc`) across every state the evaluation forks.

use crate::callable::Callable;
use crate::error::EvalError;
use crate::table::Table;
use crate::value::{ComplexValue, StructType};
use std::collections::HashMap;
use std::rc::Rc;

/// Name-to-definition registry consumed by the resolver.
#[derive(Debug, Default)]
pub struct Registry {
    callables: HashMap<String, Rc<Callable>>,
    types: HashMap<String, Rc<StructType>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Register a callable under its own name.
    pub fn register(&mut self, callable: Callable) {
        self.callables
            .insert(callable.name().to_string(), Rc::new(callable));
    }

    /// Register a table as a callable.
    pub fn register_table(&mut self, table: Table) {
        self.register(Callable::Table(Rc::new(table)));
    }

    /// Register a struct type constructor.
    pub fn register_type(&mut self, ty: StructType) {
        self.types.insert(ty.name.clone(), Rc::new(ty));
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<Callable>> {
        self.callables.get(name).cloned()
    }

    pub fn struct_type(&self, name: &str) -> Option<Rc<StructType>> {
        self.types.get(name).cloned()
    }

    /// Fresh instance of a registered struct type, leaf variables
    /// named under the type name.
    pub fn instantiate(&self, type_name: &str) -> Result<ComplexValue, EvalError> {
        let ty = self
            .types
            .get(type_name)
            .ok_or_else(|| EvalError::UnresolvedReference {
                name: type_name.to_string(),
            })?;
        Ok(ComplexValue::fresh(ty, type_name))
    }
}
