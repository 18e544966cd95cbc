//! nlq - translate a natural-language question to SQL and optionally run it.

use clap::Parser;
use nlq_core::logging::{init_logging, log_dir, LogConfig};
use nlq_core::{
    DataSource, NlQueryRequest, NlqConfig, NlqError, NlqResult, NlqService, PostgresAdapter,
    SchemaProvider, StaticSchemaProvider,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Id used when neither the data source nor the schema file names one.
const DEFAULT_DATA_SOURCE_ID: &str = "default";

#[derive(Parser, Debug)]
#[command(name = "nlq", version)]
#[command(about = "Translate a natural-language question to parameterized SQL")]
struct Args {
    /// The question, e.g. "查询最近30天金额大于100的订单"
    question: String,

    /// Schema description (JSON with tables, columns and comments)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// PostgreSQL data source descriptor (JSON); its catalog is used when
    /// no schema file is given
    #[arg(short, long)]
    data_source: Option<PathBuf>,

    /// Configuration file (defaults to $NLQ_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the generated SQL against the data source
    #[arg(short, long)]
    execute: bool,

    /// Override a generated parameter, e.g. `--param '$1=250'`
    #[arg(short, long = "param", value_name = "NAME=JSON")]
    params: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let mut log_config = LogConfig::new(log_dir());
    if let Some(filter) = &config.log_filter {
        log_config = log_config.with_filter(filter.clone());
    }
    let _logging_guard = init_logging(log_config);

    match run(args, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "nlq failed");
            eprintln!("error: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(2)
        }
    }
}

/// Answer the question; `Ok(false)` when conversion or execution failed.
async fn run(args: Args, config: NlqConfig) -> NlqResult<bool> {
    let source = args.data_source.as_deref().map(load_data_source).transpose()?;
    if args.execute && source.is_none() {
        return Err(NlqError::config("--execute requires --data-source"));
    }

    let postgres = Arc::new(PostgresAdapter::new());
    if let Some(source) = &source {
        postgres.register(source.clone())?;
    }

    let (schemas, data_source_id): (Arc<dyn SchemaProvider>, String) =
        match (&args.schema, &source) {
            (Some(path), _) => {
                let mut schema = StaticSchemaProvider::read_file(path)?;
                if let Some(source) = &source {
                    schema.data_source_id = source.id.clone();
                } else if schema.data_source_id.is_empty() {
                    schema.data_source_id = DEFAULT_DATA_SOURCE_ID.to_string();
                }
                let id = schema.data_source_id.clone();
                (Arc::new(StaticSchemaProvider::new().with_schema(schema)) as Arc<dyn SchemaProvider>, id)
            }
            (None, Some(source)) => (postgres.clone() as Arc<dyn SchemaProvider>, source.id.clone()),
            (None, None) => {
                return Err(NlqError::config("either --schema or --data-source is required"));
            }
        };

    let service = NlqService::new(schemas, postgres, config);
    if let Some(source) = source {
        service.register_data_source(source)?;
    }

    let mut request = NlQueryRequest::new(data_source_id, args.question);
    request.execute = args.execute;
    for param in &args.params {
        let (name, value) = parse_param(param)?;
        request = request.with_parameter(name, value);
    }

    let response = service.ask(request).await;
    let ok = response.conversion.success
        && response.execution.as_ref().map_or(true, |e| e.success);

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(ok)
}

fn load_config(path: Option<&Path>) -> NlqResult<NlqConfig> {
    match path {
        Some(path) => NlqConfig::load(path),
        None => NlqConfig::from_env(),
    }
}

fn load_data_source(path: &Path) -> NlqResult<DataSource> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| NlqError::config(format!("Failed to read {}: {e}", path.display())))?;
    let source: DataSource = serde_json::from_str(&contents)?;
    source.validate().map_err(NlqError::config)?;
    Ok(source)
}

/// Parse `NAME=JSON`; a value that is not valid JSON is taken as a string.
fn parse_param(raw: &str) -> NlqResult<(String, serde_json::Value)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| NlqError::input(format!("Parameter must look like NAME=VALUE: {raw}")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(NlqError::input(format!("Parameter name is empty: {raw}")));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "nlq", "--schema", "shop.json", "--execute", "-p", "$1=250", "订单数量",
        ])
        .unwrap();
        assert_eq!(args.question, "订单数量");
        assert_eq!(args.schema, Some(PathBuf::from("shop.json")));
        assert!(args.execute);
        assert_eq!(args.params, vec!["$1=250"]);
    }

    #[test]
    fn test_parse_param_values() {
        assert_eq!(parse_param("$1=250").unwrap(), ("$1".to_string(), json!(250)));
        assert_eq!(parse_param("2=已完成").unwrap(), ("2".to_string(), json!("已完成")));
        assert_eq!(parse_param("$3=\"a=b\"").unwrap(), ("$3".to_string(), json!("a=b")));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=5").is_err());
    }

    #[tokio::test]
    async fn test_execute_without_data_source_is_rejected() {
        let args = Args::try_parse_from(["nlq", "--schema", "shop.json", "--execute", "订单"]).unwrap();
        let err = run(args, NlqConfig::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Config error: --execute requires --data-source");
    }
}
