//! Shared Diesel error mapping for repositories.
//!
//! Each repository passes its own error constructors so one mapping serves
//! every port error enum.

use tracing::debug;

use super::pool::PoolError;

/// Map pool errors into a repository-specific connection error constructor.
pub fn map_basic_pool_error<E, C>(error: PoolError, connection: C) -> E
where
    C: FnOnce(String) -> E,
{
    let message = match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    };
    connection(message)
}

/// Map common Diesel error variants into query/connection constructors.
///
/// `NotFound` and query-builder failures map to query errors; a closed
/// connection maps to a connection error.
pub fn map_basic_diesel_error<E, Q, C>(error: diesel::result::Error, query: Q, connection: C) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    log_diesel_error(&error);
    match error {
        DieselError::NotFound => query("record not found"),
        DieselError::QueryBuilderError(_) => query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error")
        }
        _ => query("database error"),
    }
}

/// Like [`map_basic_diesel_error`], but unique and foreign key violations
/// map to the repository's conflict constructor with the constraint name.
pub fn map_conflicting_diesel_error<E, Q, C, X>(
    error: diesel::result::Error,
    query: Q,
    connection: C,
    conflict: X,
) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
    X: FnOnce(String) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation,
            info,
        ) => {
            log_diesel_error(&error);
            let constraint = info.constraint_name().unwrap_or("constraint").to_owned();
            conflict(constraint)
        }
        _ => map_basic_diesel_error(error, query, connection),
    }
}

fn log_diesel_error(error: &diesel::result::Error) {
    match error {
        diesel::result::Error::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(error),
            "diesel operation failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

    #[derive(Debug, PartialEq, Eq)]
    enum Mapped {
        Query(&'static str),
        Connection(&'static str),
        Conflict(String),
    }

    struct Info(Option<&'static str>);

    impl DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            "duplicate key value"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            None
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            self.0
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn map(error: DieselError) -> Mapped {
        map_conflicting_diesel_error(error, Mapped::Query, Mapped::Connection, Mapped::Conflict)
    }

    #[test]
    fn unique_violations_become_conflicts() {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(Info(Some("users_username_key"))),
        );
        assert_eq!(map(error), Mapped::Conflict("users_username_key".to_owned()));
    }

    #[test]
    fn closed_connections_become_connection_errors() {
        let error =
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, Box::new(Info(None)));
        assert_eq!(map(error), Mapped::Connection("database connection error"));
    }

    #[test]
    fn not_found_is_a_query_error() {
        assert_eq!(map(DieselError::NotFound), Mapped::Query("record not found"));
    }

    #[test]
    fn pool_errors_keep_their_message() {
        let mapped: Mapped =
            map_basic_pool_error(PoolError::checkout("timed out"), |message| {
                Mapped::Conflict(message)
            });
        assert_eq!(mapped, Mapped::Conflict("timed out".to_owned()));
    }
}
