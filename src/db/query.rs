//! Builder for the document store's SQL dialect.
//!
//! Values are interpolated literally; only pass trusted inputs.

/// Accumulates `SELECT` / `WHERE` clauses over the `c` container alias.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    select_clause: String,
    where_clause: String,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self {
            select_clause: "SELECT *".to_string(),
            where_clause: String::new(),
        }
    }

    /// Project specific fields instead of `*`. Empty list is a no-op.
    pub fn select(mut self, fields: &[&str]) -> Self {
        if !fields.is_empty() {
            let ready: Vec<String> = fields.iter().map(|f| format!("c.{f}")).collect();
            self.select_clause = format!("SELECT {}", ready.join(", "));
        }
        self
    }

    /// Append `c.<field> = '<value>'`, joined to earlier predicates with `AND`.
    pub fn where_eq(mut self, field: &str, value: &str) -> Self {
        if field.is_empty() {
            return self;
        }
        let predicate = format!("c.{field} = '{value}'");
        if self.where_clause.is_empty() {
            self.where_clause = format!(" WHERE {predicate}");
        } else {
            self.where_clause.push_str(" AND ");
            self.where_clause.push_str(&predicate);
        }
        self
    }

    pub fn build(&self) -> String {
        format!("{} FROM c{}", self.select_clause, self.where_clause)
    }
}
