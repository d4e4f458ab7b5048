#![cfg(feature = "sqlite")]

use chrono::{Duration, TimeZone, Utc};
use sql_bridge::driver::sqlite::RETURN_VALUE_NAME;
use sql_bridge::prelude::*;

fn customer_driver() -> SqliteDriver {
    SqliteDriver::new()
        .with_procedure(
            Procedure::new(
                "new_customer",
                "INSERT INTO customer (firstname, lastname, created)
                 VALUES (:firstname, :lastname, CURRENT_TIMESTAMP)",
            )
            .param("firstname", SqlType::Varchar)
            .param("lastname", SqlType::Varchar),
        )
        .with_procedure(
            Procedure::new(
                "customer_lastname",
                "SELECT lastname FROM customer WHERE firstname = :firstname",
            )
            .param("firstname", SqlType::Varchar)
            .out_param("lastname", SqlType::Varchar),
        )
        .with_procedure(
            Procedure::new("times2", "SELECT :param * 2 AS param")
                .in_out_param("param", SqlType::Integer),
        )
        .with_procedure(
            Procedure::new("an_hour_before", "SELECT datetime(:ts, '-1 hour')")
                .param("ts", SqlType::TimestampWithTimezone)
                .returns(SqlType::TimestampWithTimezone),
        )
}

async fn customer_pool(name: &str) -> Result<Pool, SqlBridgeError> {
    let mut registry = DriverRegistry::new();
    registry.register(customer_driver());
    let pool = Pool::new(
        &registry,
        ConnectOptions::new(format!("sqlite:file:{name}?mode=memory&cache=shared")),
        PoolOptions::new(1),
    )?;
    pool.execute_batch(
        "CREATE TABLE customer (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            firstname VARCHAR(50) NOT NULL,
            lastname VARCHAR(50) NOT NULL,
            created TIMESTAMP
        );",
    )
    .await?;
    Ok(pool)
}

#[tokio::test]
async fn procedure_without_outputs_inserts_a_row() -> Result<(), SqlBridgeError> {
    let pool = customer_pool("procs_new_customer").await?;

    let result = pool
        .prepared_query("{call new_customer(?, ?)}")
        .execute(params!["Paulo", "Lopes"])
        .await?;
    assert_eq!(result.rows_affected(), 1);
    assert!(result.output_values().is_none());

    let rows = pool
        .query("SELECT id, created FROM customer WHERE firstname = 'Paulo' AND lastname = 'Lopes'")
        .execute()
        .await?;
    assert_eq!(rows.size(), 1);
    let row = rows.first().expect("one customer");
    assert!(row.get_int("id").is_some());
    assert!(row.get_timestamp("created").is_some());
    Ok(())
}

#[tokio::test]
async fn out_parameter_comes_back_as_an_output_row() -> Result<(), SqlBridgeError> {
    let pool = customer_pool("procs_out_param").await?;
    pool.prepared_query("{call new_customer(?, ?)}")
        .execute(params!["Paulo", "Lopes"])
        .await?;

    let result = pool
        .prepared_query("{call customer_lastname(?, ?)}")
        .execute(params!["Paulo", Param::out(SqlType::Varchar)])
        .await?;
    assert!(result.is_output());
    assert_eq!(result.size(), 1);
    // The lookup only reads; the insert before it must not leak into the count.
    assert_eq!(result.rows_affected(), 0);
    let out = result.first().expect("output row");
    assert_eq!(out.len(), 1);
    assert_eq!(out.get_text("lastname"), Some("Lopes"));
    assert_eq!(out.get_text(0), Some("Lopes"));
    assert_eq!(
        result.columns().get(0).and_then(|c| c.sql_type.clone()),
        Some(SqlType::Varchar)
    );

    // Unknown customer: the OUT parameter is NULL.
    let result = pool
        .prepared_query("{call customer_lastname(?, ?)}")
        .execute(params!["Nobody", Param::out(SqlType::Varchar)])
        .await?;
    assert!(result.first().expect("output row").is_null(0));
    Ok(())
}

#[tokio::test]
async fn inout_parameter_is_updated() -> Result<(), SqlBridgeError> {
    let pool = customer_pool("procs_inout").await?;
    let result = pool
        .prepared_query("{call times2(?)}")
        .execute(params![Param::in_out(SqlType::Integer, 21)])
        .await?;
    assert_eq!(result.first().and_then(|r| r.get_int("param")), Some(42));
    Ok(())
}

#[tokio::test]
async fn function_return_value_is_the_first_output() -> Result<(), SqlBridgeError> {
    let pool = customer_pool("procs_function").await?;
    let noon = Utc
        .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
        .fixed_offset();

    let result = pool
        .prepared_query("{? = call an_hour_before(?)}")
        .execute(params![Param::out(SqlType::TimestampWithTimezone), noon])
        .await?;
    let row = result.first().expect("output row");
    assert_eq!(row.columns().names(), vec![RETURN_VALUE_NAME]);
    assert_eq!(row.get_timestamp(RETURN_VALUE_NAME), Some(noon - Duration::hours(1)));
    Ok(())
}

#[tokio::test]
async fn misuse_of_a_routine_is_a_statement_error() -> Result<(), SqlBridgeError> {
    let pool = customer_pool("procs_misuse").await?;

    // OUT parameter bound as an input value.
    let err = pool
        .prepared_query("{call customer_lastname(?, ?)}")
        .execute(params!["Paulo", "Lopes"])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlBridgeError::Driver(DriverError::Statement(_))));

    // Wrong arity.
    let err = pool
        .prepared_query("{call times2(?, ?)}")
        .execute(params![Param::in_out(SqlType::Integer, 1), 2])
        .await
        .unwrap_err();
    assert!(!err.is_connection_error());

    // Procedures have no return slot.
    let err = pool
        .prepared_query("{? = call times2(?)}")
        .execute(params![
            Param::out(SqlType::Integer),
            Param::in_out(SqlType::Integer, 1)
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlBridgeError::Driver(DriverError::Statement(_))));

    // OUT parameters outside a call never reach the driver.
    let err = pool
        .prepared_query("SELECT ?")
        .execute(params![Param::out(SqlType::Integer)])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlBridgeError::StatementError(_)));

    // The single connection survived every failure.
    assert_eq!(pool.status().size, 1);
    assert_eq!(pool.status().idle, 1);
    Ok(())
}
