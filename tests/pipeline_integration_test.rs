use amc_etl::config::{AmcConfig, SnowflakeConfig};
use amc_etl::core::DateRange;
use amc_etl::{AppConfig, EtlEngine, EtlError};
use anyhow::Result;
use httpmock::prelude::*;
use httpmock::Mock;
use tempfile::TempDir;

const CAMPAIGN_SQL: &str = "SELECT * FROM t WHERE d BETWEEN {{start_date}} AND {{end_date}}";
const RESOLVED_SQL: &str = "SELECT * FROM t WHERE d BETWEEN 2024-01-01 AND 2024-01-31";
const AMC_CSV: &str = "\
report_date,campaign,impressions,clicks
2024-01-01,Brand,1000,10
2024-01-02,,250,
2024-01-03,Generic,300,4
";

struct Fixture {
    _queries: TempDir,
    amc: MockServer,
    snowflake: MockServer,
    config: AppConfig,
}

fn fixture(chunk_size: Option<usize>) -> Result<Fixture> {
    let queries = TempDir::new()?;
    std::fs::write(
        queries.path().join("amc_queries.json"),
        serde_json::json!({ "campaign_perf": { "sql": CAMPAIGN_SQL } }).to_string(),
    )?;

    let amc = MockServer::start();
    let snowflake = MockServer::start();

    let config = AppConfig {
        amc: AmcConfig {
            api_endpoint: Some(amc.url("/api/v1/query")),
            client_id: Some("etl_client".to_string()),
            client_secret: Some("secret_123".to_string()),
        },
        snowflake: SnowflakeConfig {
            user: Some("loader".to_string()),
            password: Some("pw".to_string()),
            account: Some("xy12345".to_string()),
            warehouse: Some("COMPUTE_WH".to_string()),
            database: Some("ADS".to_string()),
            schema: Some("AMC".to_string()),
            host: Some(snowflake.base_url()),
            chunk_size: chunk_size.map(|n| n.to_string()),
        },
        queries_dir: Some(queries.path().to_string_lossy().into_owned()),
    };

    Ok(Fixture {
        _queries: queries,
        amc,
        snowflake,
        config,
    })
}

fn january() -> DateRange {
    DateRange::new(Some("2024-01-01".into()), Some("2024-01-31".into()))
}

fn mock_token(server: &MockServer) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/auth/token")
            .x_www_form_urlencoded_tuple("grant_type", "client_credentials");
        then.status(200)
            .json_body(serde_json::json!({ "access_token": "amc-token", "expires_in": 3600 }));
    })
}

fn mock_query<'a>(server: &'a MockServer, status: u16, body: &str) -> Mock<'a> {
    let body = body.to_string();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/query")
            .header("authorization", "Bearer amc-token")
            .json_body(serde_json::json!({ "query": RESOLVED_SQL, "format": "CSV" }));
        then.status(status).body(body);
    })
}

struct SnowflakeMocks<'a> {
    login: Mock<'a>,
    create: Mock<'a>,
    insert: Mock<'a>,
    logout: Mock<'a>,
}

fn mock_snowflake<'a>(server: &'a MockServer, insert_ok: bool, reported_rows: &str) -> SnowflakeMocks<'a> {
    let login = server.mock(|when, then| {
        when.method(POST)
            .path("/session/v1/login-request")
            .query_param("warehouse", "COMPUTE_WH")
            .query_param("databaseName", "ADS")
            .query_param("schemaName", "AMC")
            .json_body_partial(r#"{"data": {"LOGIN_NAME": "loader", "PASSWORD": "pw", "ACCOUNT_NAME": "xy12345"}}"#);
        then.status(200).json_body(serde_json::json!({
            "success": true,
            "data": { "token": "sf-session" }
        }));
    });

    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/queries/v1/query-request")
            .header("authorization", "Snowflake Token=\"sf-session\"")
            .body_contains("CREATE TABLE IF NOT EXISTS");
        then.status(200).json_body(serde_json::json!({
            "success": true,
            "data": { "rowset": [["Table CAMPAIGN_PERF successfully created."]] }
        }));
    });

    let insert_body = if insert_ok {
        serde_json::json!({ "success": true, "data": { "rowset": [[reported_rows]] } })
    } else {
        serde_json::json!({
            "success": false,
            "code": "002003",
            "message": "Table 'CAMPAIGN_PERF' does not exist or not authorized."
        })
    };
    let insert = server.mock(|when, then| {
        when.method(POST)
            .path("/queries/v1/query-request")
            .body_contains("INSERT INTO");
        then.status(200).json_body(insert_body);
    });

    let logout = server.mock(|when, then| {
        when.method(POST)
            .path("/session")
            .query_param("delete", "true")
            .header("authorization", "Snowflake Token=\"sf-session\"");
        then.status(200)
            .json_body(serde_json::json!({ "success": true, "data": null }));
    });

    SnowflakeMocks {
        login,
        create,
        insert,
        logout,
    }
}

#[tokio::test]
async fn test_end_to_end_amc_to_snowflake() -> Result<()> {
    let fx = fixture(None)?;
    let token = mock_token(&fx.amc);
    let query = mock_query(&fx.amc, 200, AMC_CSV);
    let sf = mock_snowflake(&fx.snowflake, true, "3");

    let engine = EtlEngine::from_config(&fx.config)?;
    let result = engine.run("campaign_perf", &january()).await?;

    token.assert();
    query.assert();
    sf.login.assert();
    sf.create.assert();
    sf.insert.assert();
    sf.logout.assert();

    assert_eq!(result.status, "success");
    assert_eq!(result.query_name, "campaign_perf");
    assert_eq!(result.records_processed, 3);
    assert!(result.load_details.success);
    assert_eq!(result.load_details.chunks_processed, 1);
    assert_eq!(result.load_details.rows_loaded, 3);
    Ok(())
}

#[tokio::test]
async fn test_chunked_load_keeps_both_counts() -> Result<()> {
    let fx = fixture(Some(2))?;
    mock_token(&fx.amc);
    mock_query(&fx.amc, 200, AMC_CSV);
    let sf = mock_snowflake(&fx.snowflake, true, "5");

    let engine = EtlEngine::from_config(&fx.config)?;
    let result = engine.run("campaign_perf", &january()).await?;

    sf.insert.assert_hits(2);
    assert_eq!(result.load_details.chunks_processed, 2);
    // the warehouse-reported count is passed through untouched
    assert_eq!(result.load_details.rows_loaded, 10);
    assert_eq!(result.records_processed, 3);
    Ok(())
}

#[tokio::test]
async fn test_extraction_failure_never_opens_warehouse() -> Result<()> {
    let fx = fixture(None)?;
    mock_token(&fx.amc);
    let query = mock_query(&fx.amc, 500, "internal error: workflow failed");
    let sf = mock_snowflake(&fx.snowflake, true, "3");

    let engine = EtlEngine::from_config(&fx.config)?;
    let err = engine.run("campaign_perf", &january()).await.unwrap_err();

    query.assert();
    assert!(
        matches!(&err, EtlError::ExtractionFailure { body, .. } if body == "internal error: workflow failed")
    );
    sf.login.assert_hits(0);
    sf.insert.assert_hits(0);
    Ok(())
}

#[tokio::test]
async fn test_auth_failure_stops_before_extraction() -> Result<()> {
    let fx = fixture(None)?;
    let token = fx.amc.mock(|when, then| {
        when.method(POST).path("/auth/token");
        then.status(401).body("invalid_client");
    });
    let query = mock_query(&fx.amc, 200, AMC_CSV);
    let sf = mock_snowflake(&fx.snowflake, true, "3");

    let engine = EtlEngine::from_config(&fx.config)?;
    let err = engine.run("campaign_perf", &january()).await.unwrap_err();

    token.assert();
    assert!(matches!(err, EtlError::AuthFailure { .. }));
    query.assert_hits(0);
    sf.login.assert_hits(0);
    Ok(())
}

#[tokio::test]
async fn test_malformed_date_never_loads() -> Result<()> {
    let fx = fixture(None)?;
    mock_token(&fx.amc);
    mock_query(&fx.amc, 200, "report_date,clicks\n2024-01-01,1\nlast tuesday,2\n");
    let sf = mock_snowflake(&fx.snowflake, true, "2");

    let engine = EtlEngine::from_config(&fx.config)?;
    let err = engine.run("campaign_perf", &january()).await.unwrap_err();

    assert!(matches!(err, EtlError::MalformedDate { row: 2, .. }));
    sf.login.assert_hits(0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_query_makes_no_network_calls() -> Result<()> {
    let fx = fixture(None)?;
    let token = mock_token(&fx.amc);
    let sf = mock_snowflake(&fx.snowflake, true, "3");

    let engine = EtlEngine::from_config(&fx.config)?;
    let err = engine.run("does_not_exist", &january()).await.unwrap_err();

    assert!(matches!(err, EtlError::UnknownQuery { .. }));
    token.assert_hits(0);
    sf.login.assert_hits(0);
    Ok(())
}

#[tokio::test]
async fn test_insert_failure_still_logs_out() -> Result<()> {
    let fx = fixture(None)?;
    mock_token(&fx.amc);
    mock_query(&fx.amc, 200, AMC_CSV);
    let sf = mock_snowflake(&fx.snowflake, false, "0");

    let engine = EtlEngine::from_config(&fx.config)?;
    let err = engine.run("campaign_perf", &january()).await.unwrap_err();

    assert!(
        matches!(&err, EtlError::LoadFailure { message } if message.contains("does not exist"))
    );
    sf.login.assert();
    sf.insert.assert();
    sf.logout.assert();
    Ok(())
}

#[tokio::test]
async fn test_rejected_login_is_load_failure() -> Result<()> {
    let fx = fixture(None)?;
    mock_token(&fx.amc);
    mock_query(&fx.amc, 200, AMC_CSV);
    let login = fx.snowflake.mock(|when, then| {
        when.method(POST).path("/session/v1/login-request");
        then.status(200).json_body(serde_json::json!({
            "success": false,
            "code": "390100",
            "message": "Incorrect username or password was specified."
        }));
    });

    let engine = EtlEngine::from_config(&fx.config)?;
    let err = engine.run("campaign_perf", &january()).await.unwrap_err();

    login.assert();
    assert!(err.to_string().starts_with("Failed to load data to Snowflake"));
    assert!(err.to_string().contains("Incorrect username or password"));
    Ok(())
}

#[tokio::test]
async fn test_missing_snowflake_settings_fail_at_load() -> Result<()> {
    let mut fx = fixture(None)?;
    fx.config.snowflake.password = None;
    let token = mock_token(&fx.amc);
    mock_query(&fx.amc, 200, AMC_CSV);

    let engine = EtlEngine::from_config(&fx.config)?;
    let err = engine.run("campaign_perf", &january()).await.unwrap_err();

    // AMC ran first: configuration gaps surface where the value is first needed
    token.assert();
    assert!(matches!(&err, EtlError::LoadFailure { message } if message.contains("SNOWFLAKE_PASSWORD")));
    Ok(())
}
