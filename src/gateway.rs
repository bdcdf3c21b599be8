//! Data-access gateway
//!
//! Every database interaction in the service goes through [`Gateway`]: one
//! pooled connection is checked out, exactly one statement runs inside a
//! transaction on it, and the connection goes back to the pool when the call
//! returns. Nothing holds a connection across two statements.

use std::time::{Duration, Instant};

use diesel::PgConnection;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::query_dsl::LoadQuery;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::serialize::ToSql;
use diesel::sql_types::{BigInt, HasSqlType};
use thiserror::Error;
use tracing::{debug, warn};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

type BoxedQuery = BoxedSqlQuery<'static, Pg, SqlQuery>;
type Binder = Box<dyn FnOnce(BoxedQuery) -> BoxedQuery + Send>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No connection could be checked out of the pool in time.
    #[error("database unavailable: {0}")]
    Unavailable(String),
    /// The statement itself failed; carries the driver message.
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl GatewayError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// How the gateway shapes the result of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    Write,
    One,
    All,
    InsertedId,
}

impl ResultMode {
    fn as_str(&self) -> &'static str {
        match self {
            ResultMode::Write => "write",
            ResultMode::One => "one",
            ResultMode::All => "all",
            ResultMode::InsertedId => "inserted_id",
        }
    }
}

/// A SQL template with `$n` placeholders and its ordered bind parameters
pub struct Statement {
    sql: String,
    binds: Vec<Binder>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    /// Bind the next positional parameter
    pub fn bind<ST, V>(mut self, value: V) -> Self
    where
        Pg: HasSqlType<ST>,
        V: ToSql<ST, Pg> + Send + 'static,
        ST: Send + 'static,
    {
        self.binds
            .push(Box::new(move |query: BoxedQuery| query.bind::<ST, V>(value)));
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.binds.len()
    }

    /// Placeholder for the parameter that the next `bind` call will fill
    fn next_placeholder(&self) -> String {
        format!("${}", self.binds.len() + 1)
    }

    fn push_sql(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn into_query(self) -> BoxedQuery {
        let Statement { sql, binds } = self;
        binds
            .into_iter()
            .fold(diesel::sql_query(sql).into_boxed::<Pg>(), |query, bind| {
                bind(query)
            })
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("params", &self.binds.len())
            .finish()
    }
}

/// Builds a parameterized `UPDATE ... SET ... WHERE id = $n` where only the
/// fields that were supplied become assignments.
pub struct UpdateBuilder {
    statement: Statement,
    assignments: usize,
}

impl UpdateBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            statement: Statement::new(format!("UPDATE {} SET ", table)),
            assignments: 0,
        }
    }

    fn push_assignment(&mut self, assignment: &str) {
        if self.assignments > 0 {
            self.statement.push_sql(", ");
        }
        self.statement.push_sql(assignment);
        self.assignments += 1;
    }

    pub fn set<ST, V>(mut self, column: &str, value: V) -> Self
    where
        Pg: HasSqlType<ST>,
        V: ToSql<ST, Pg> + Send + 'static,
        ST: Send + 'static,
    {
        let assignment = format!("{} = {}", column, self.statement.next_placeholder());
        self.push_assignment(&assignment);
        self.statement = self.statement.bind::<ST, V>(value);
        self
    }

    pub fn set_if_present<ST, V>(self, column: &str, value: Option<V>) -> Self
    where
        Pg: HasSqlType<ST>,
        V: ToSql<ST, Pg> + Send + 'static,
        ST: Send + 'static,
    {
        match value {
            Some(value) => self.set::<ST, V>(column, value),
            None => self,
        }
    }

    /// Assignment to a SQL expression that needs no parameter, e.g. `NOW()`
    pub fn set_expr(mut self, column: &str, expression: &str) -> Self {
        let assignment = format!("{} = {}", column, expression);
        self.push_assignment(&assignment);
        self
    }

    /// Number of assignments added so far
    pub fn assignment_count(&self) -> usize {
        self.assignments
    }

    pub fn where_id(mut self, id: i64) -> Statement {
        let clause = format!(" WHERE id = {}", self.statement.next_placeholder());
        self.statement.push_sql(&clause);
        self.statement.bind::<BigInt, _>(id)
    }
}

#[derive(QueryableByName)]
struct InsertedId {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

#[derive(QueryableByName)]
struct RowCount {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

#[derive(Clone)]
pub struct Gateway {
    pool: PgPool,
}

impl Gateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute a write and commit it; returns the number of affected rows
    pub async fn write(&self, statement: Statement) -> Result<usize, GatewayError> {
        self.run(statement, ResultMode::Write, |conn, query| query.execute(conn))
            .await
    }

    pub async fn fetch_one<T>(&self, statement: Statement) -> Result<Option<T>, GatewayError>
    where
        T: QueryableByName<Pg> + Send + 'static,
        BoxedQuery: LoadQuery<'static, PgConnection, T>,
    {
        self.run(statement, ResultMode::One, |conn, query| {
            query.get_result::<T>(conn).optional()
        })
        .await
    }

    pub async fn fetch_all<T>(&self, statement: Statement) -> Result<Vec<T>, GatewayError>
    where
        T: QueryableByName<Pg> + Send + 'static,
        BoxedQuery: LoadQuery<'static, PgConnection, T>,
    {
        self.run(statement, ResultMode::All, |conn, query| query.load::<T>(conn))
            .await
    }

    /// Execute an `INSERT ... RETURNING id` and return the new identifier
    pub async fn insert_returning_id(&self, statement: Statement) -> Result<i64, GatewayError> {
        self.run(statement, ResultMode::InsertedId, |conn, query| {
            query.get_result::<InsertedId>(conn).map(|row| row.id)
        })
        .await
    }

    /// Execute a `SELECT COUNT(*) AS total ...` statement
    pub async fn count(&self, statement: Statement) -> Result<i64, GatewayError> {
        self.run(statement, ResultMode::One, |conn, query| {
            query.get_result::<RowCount>(conn).map(|row| row.total)
        })
        .await
    }

    async fn run<R, F>(
        &self,
        statement: Statement,
        mode: ResultMode,
        operation: F,
    ) -> Result<R, GatewayError>
    where
        R: Send + 'static,
        F: FnOnce(&mut PgConnection, BoxedQuery) -> QueryResult<R> + Send + 'static,
    {
        let pool = self.pool.clone();
        let sql = statement.sql().to_string();
        let mode_label = mode.as_str();
        let query = statement.into_query();

        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let mut pooled = pool.get().map_err(|e| {
                metrics::counter!("gateway.unavailable_total").increment(1);
                warn!(error = %e, "Failed to check out a database connection");
                GatewayError::Unavailable(e.to_string())
            })?;
            let conn: &mut PgConnection = &mut pooled;

            // Commits when the closure succeeds, rolls back otherwise
            let result = conn.transaction(|conn| operation(conn, query));

            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            metrics::histogram!("gateway.statement_duration_ms", "mode" => mode_label)
                .record(elapsed_ms);

            match result {
                Ok(value) => {
                    debug!(mode = mode_label, elapsed_ms, "Statement completed");
                    Ok(value)
                }
                Err(e) => {
                    metrics::counter!("gateway.query_failed_total", "mode" => mode_label)
                        .increment(1);
                    warn!(mode = mode_label, sql = %sql, error = %e, "Statement failed, rolled back");
                    Err(GatewayError::QueryFailed(e.to_string()))
                }
            }
        })
        .await
        .map_err(|e| GatewayError::QueryFailed(format!("database task failed: {}", e)))?
    }
}

/// Build the r2d2 pool used by the gateway
pub fn build_pool(
    database_url: &str,
    max_size: u32,
    connection_timeout: Duration,
) -> Result<PgPool, r2d2::Error> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .connection_timeout(connection_timeout)
        .build(manager)
}

/// Build a pool without opening any connection up front
pub fn build_lazy_pool(database_url: &str, max_size: u32, connection_timeout: Duration) -> PgPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .min_idle(Some(0))
        .connection_timeout(connection_timeout)
        .build_unchecked(manager)
}
