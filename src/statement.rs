use crate::error::SqlBridgeError;
use crate::sql::{self, CallTarget, SqlShape};
use crate::types::{RowValues, SqlType};

/// One bound parameter: an input value, or a direction descriptor for callable statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    In(RowValues),
    /// OUT parameter registered with its SQL type; the value comes back after execution.
    Out(SqlType),
    /// INOUT parameter: declared type plus the initial value sent to the routine.
    InOut(SqlType, RowValues),
}

impl Param {
    #[must_use]
    pub fn out(sql_type: SqlType) -> Self {
        Param::Out(sql_type)
    }

    #[must_use]
    pub fn in_out(sql_type: SqlType, value: impl Into<RowValues>) -> Self {
        Param::InOut(sql_type, value.into())
    }

    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self, Param::In(_))
    }

    /// Declared type for OUT/INOUT parameters.
    #[must_use]
    pub fn out_type(&self) -> Option<&SqlType> {
        match self {
            Param::In(_) => None,
            Param::Out(sql_type) | Param::InOut(sql_type, _) => Some(sql_type),
        }
    }
}

impl<T: Into<RowValues>> From<T> for Param {
    fn from(value: T) -> Self {
        Param::In(value.into())
    }
}

/// Ordered parameter list for one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub Vec<Param>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn with(mut self, param: impl Into<Param>) -> Self {
        self.0.push(param.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Param>> for Params {
    fn from(params: Vec<Param>) -> Self {
        Params(params)
    }
}

impl From<Vec<RowValues>> for Params {
    fn from(values: Vec<RowValues>) -> Self {
        Params(values.into_iter().map(Param::In).collect())
    }
}

impl From<&[RowValues]> for Params {
    fn from(values: &[RowValues]) -> Self {
        Params(values.iter().cloned().map(Param::In).collect())
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::new()
    }
}

impl<P: Into<Param>> FromIterator<P> for Params {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Params(iter.into_iter().map(Into::into).collect())
    }
}

/// Build [`Params`] from anything convertible into [`Param`].
///
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let params = params!["John", Param::out(SqlType::Varchar)];
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::statement::Params::new()
    };
    ($($param:expr),+ $(,)?) => {
        $crate::statement::Params(vec![$($crate::statement::Param::from($param)),+])
    };
}

/// SQL text plus its bound parameters, validated against the placeholders in the text.
#[derive(Debug, Clone)]
pub struct StatementSpec {
    sql: String,
    params: Vec<Param>,
    shape: SqlShape,
}

impl StatementSpec {
    /// Build and validate a statement.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::StatementError`] when the number of parameters does not match the
    /// placeholders, when OUT/INOUT parameters appear outside a `{call ...}` escape, or when the
    /// return slot of `{? = call ...}` is not an OUT parameter.
    pub fn new(sql: impl Into<String>, params: impl Into<Params>) -> Result<Self, SqlBridgeError> {
        let sql = sql.into();
        let Params(params) = params.into();
        let shape = sql::analyze(&sql)?;

        if shape.placeholders != params.len() {
            return Err(SqlBridgeError::StatementError(format!(
                "statement expects {} parameter(s) but {} were bound",
                shape.placeholders,
                params.len()
            )));
        }

        match &shape.call {
            None => {
                if let Some(pos) = params.iter().position(|p| !p.is_input()) {
                    return Err(SqlBridgeError::StatementError(format!(
                        "parameter {} is OUT/INOUT but the statement is not a {{call ...}}",
                        pos + 1
                    )));
                }
            }
            Some(call) if call.has_return => {
                if !matches!(params.first(), Some(Param::Out(_))) {
                    return Err(SqlBridgeError::StatementError(
                        "the return slot of `{? = call ...}` must be bound to Param::Out".into(),
                    ));
                }
            }
            Some(_) => {}
        }

        Ok(Self { sql, params, shape })
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn call(&self) -> Option<&CallTarget> {
        self.shape.call.as_ref()
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.shape.call.is_some()
    }
}
