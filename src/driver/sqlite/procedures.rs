use std::collections::HashMap;

use crate::types::SqlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureParam {
    pub name: String,
    pub mode: ParamMode,
    pub sql_type: SqlType,
}

/// A stored routine emulated on top of SQLite.
///
/// The body is a single SQL statement referring to parameters as `:name`. When the routine has
/// OUT/INOUT parameters or a return type, the body runs as a query and its first row supplies
/// the outputs: OUT/INOUT parameters by matching column name, the return value from the first
/// column.
///
/// ```rust
/// use sql_bridge::driver::sqlite::Procedure;
/// use sql_bridge::types::SqlType;
///
/// let times2 = Procedure::new("times2", "select :param * 2 as param")
///     .in_out_param("param", SqlType::Integer);
/// # let _ = times2;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    name: String,
    params: Vec<ProcedureParam>,
    returns: Option<SqlType>,
    body: String,
}

impl Procedure {
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn param(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.with_param(name, ParamMode::In, sql_type)
    }

    #[must_use]
    pub fn out_param(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.with_param(name, ParamMode::Out, sql_type)
    }

    #[must_use]
    pub fn in_out_param(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.with_param(name, ParamMode::InOut, sql_type)
    }

    /// Make this a function, callable as `{? = call name(...)}`.
    #[must_use]
    pub fn returns(mut self, sql_type: SqlType) -> Self {
        self.returns = Some(sql_type);
        self
    }

    fn with_param(mut self, name: impl Into<String>, mode: ParamMode, sql_type: SqlType) -> Self {
        self.params.push(ProcedureParam {
            name: name.into(),
            mode,
            sql_type,
        });
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[ProcedureParam] {
        &self.params
    }

    #[must_use]
    pub fn return_type(&self) -> Option<&SqlType> {
        self.returns.as_ref()
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether executing the body produces values for the caller beyond rows.
    #[must_use]
    pub fn has_outputs(&self) -> bool {
        self.returns.is_some() || self.params.iter().any(|p| p.mode != ParamMode::In)
    }
}

/// Routines known to a [`SqliteDriver`](super::SqliteDriver), looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ProcedureCatalog {
    procedures: HashMap<String, Procedure>,
}

impl ProcedureCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, procedure: Procedure) -> &mut Self {
        self.procedures
            .insert(procedure.name.to_ascii_lowercase(), procedure);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut catalog = ProcedureCatalog::new();
        catalog.register(
            Procedure::new("Customer_Lastname", "select lastname from customers")
                .param("firstname", SqlType::Varchar)
                .out_param("lastname", SqlType::Varchar),
        );
        let proc = catalog.get("customer_lastname").unwrap();
        assert_eq!(proc.params().len(), 2);
        assert!(proc.has_outputs());
    }

    #[test]
    fn in_only_procedure_has_no_outputs() {
        let proc = Procedure::new("touch", "update t set n = n + 1").param("id", SqlType::Integer);
        assert!(!proc.has_outputs());
        assert!(Procedure::new("now", "select 1").returns(SqlType::Integer).has_outputs());
    }
}
