//! Database node: one SQL statement (PostgreSQL, MySQL) or one MongoDB
//! collection operation per run.
//!
//! Connection settings come from `api_keys[db_type]`, either a connection
//! URL string or an object. Connections are opened and closed per run.

use async_trait::async_trait;
use chaincore::{Node, NodeContext, NodeError, NodeMetadata, NodeParams, ParamDefinition, State, Value};
use futures_util::TryStreamExt;
use mongodb::bson::{self, Bson, Document};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, Column, Connection, Row};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgresql,
    Mysql,
    Mongodb,
}

impl DbType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Some(DbType::Postgresql),
            "mysql" => Some(DbType::Mysql),
            "mongodb" | "mongo" => Some(DbType::Mongodb),
            _ => None,
        }
    }

    /// Key under which connection settings live in `api_keys`
    pub fn credential_key(self) -> &'static str {
        match self {
            DbType::Postgresql => "postgresql",
            DbType::Mysql => "mysql",
            DbType::Mongodb => "mongodb",
        }
    }

    fn url_scheme(self) -> &'static str {
        match self {
            DbType::Postgresql => "postgres",
            DbType::Mysql => "mysql",
            DbType::Mongodb => "mongodb",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            DbType::Postgresql => 5432,
            DbType::Mysql => 3306,
            DbType::Mongodb => 27017,
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.credential_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" | "find" => Some(Operation::Select),
            "insert" => Some(Operation::Insert),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Parsed options for one database step
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseParams {
    pub db_type: DbType,
    pub operation: Operation,
    pub query: String,
    pub parameters: Vec<Value>,
    pub collection: Option<String>,
}

impl DatabaseParams {
    pub fn from_params(params: &NodeParams) -> Result<Self, NodeError> {
        let db_type = match params.get_non_empty_str("db_type")? {
            None => DbType::Postgresql,
            Some(raw) => DbType::parse(raw)
                .ok_or_else(|| NodeError::invalid_param("db_type", "expected postgresql, mysql or mongodb"))?,
        };

        let operation = match params.get_non_empty_str("operation")? {
            None => Operation::Select,
            Some(raw) => Operation::parse(raw)
                .ok_or_else(|| NodeError::invalid_param("operation", "expected select, insert, update or delete"))?,
        };

        // MongoDB queries may be given as JSON values rather than strings
        let query = match params.get("query") {
            None => return Err(NodeError::MissingParam("query".to_string())),
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(NodeError::MissingParam("query".to_string()))
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) if db_type == DbType::Mongodb => other.to_json().to_string(),
            Some(_) => return Err(NodeError::invalid_param("query", "expected a SQL string")),
        };

        let parameters = params.get_array("parameters")?.map(<[Value]>::to_vec).unwrap_or_default();
        if let Some(bad) = parameters
            .iter()
            .position(|p| matches!(p, Value::Array(_) | Value::Object(_)))
        {
            return Err(NodeError::invalid_param(
                "parameters",
                format!("entry {} must be a scalar", bad),
            ));
        }

        let collection = params.get_non_empty_str("collection")?.map(str::to_string);
        if db_type == DbType::Mongodb {
            if collection.is_none() {
                return Err(NodeError::MissingParam("collection".to_string()));
            }
            mongo_query(&query, operation)?;
        }

        Ok(Self {
            db_type,
            operation,
            query,
            parameters,
            collection,
        })
    }
}

/// Connection string for a SQL database.
///
/// A string credential (or a `url` field) is used as given. Otherwise the
/// URL is assembled from its fields with user, password and database name
/// percent-encoded.
pub fn sql_url(db_type: DbType, credential: &Value) -> Result<String, NodeError> {
    let missing = || NodeError::MissingCredential(db_type.credential_key().to_string());
    let invalid = |what: &str| NodeError::Configuration(format!("{}: invalid {}", db_type, what));
    match credential {
        Value::String(url) if !url.trim().is_empty() => Ok(url.clone()),
        Value::Object(fields) => {
            let field = |name: &str| fields.get(name).and_then(Value::as_str).filter(|s| !s.is_empty());
            if let Some(url) = field("url") {
                return Ok(url.to_string());
            }

            let host = field("host").unwrap_or("localhost");
            let port: u16 = match fields.get("port") {
                None | Some(Value::Null) => db_type.default_port(),
                Some(Value::String(p)) => p.trim().parse().map_err(|_| invalid("port"))?,
                Some(p) => p
                    .as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| invalid("port"))?,
            };
            let user = field("user").or_else(|| field("username")).ok_or_else(missing)?;
            let database = field("database").or_else(|| field("dbname")).ok_or_else(missing)?;

            let mut url = Url::parse(&format!("{}://{}", db_type.url_scheme(), host))
                .map_err(|_| invalid("host"))?;
            url.set_port(Some(port)).map_err(|_| invalid("port"))?;
            url.set_username(user).map_err(|_| invalid("user"))?;
            url.set_password(field("password")).map_err(|_| invalid("password"))?;
            url.path_segments_mut()
                .map_err(|_| invalid("host"))?
                .push(database);
            Ok(url.to_string())
        }
        _ => Err(missing()),
    }
}

/// Connection string and database name for MongoDB
pub fn mongo_target(credential: &Value, params: &NodeParams) -> Result<(String, String), NodeError> {
    let missing = |what: &str| NodeError::MissingCredential(format!("mongodb.{}", what));
    let (uri, database) = match credential {
        Value::String(uri) => (Some(uri.clone()), None),
        Value::Object(fields) => {
            let field = |name: &str| {
                fields
                    .get(name)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            (
                field("connection_string").or_else(|| field("url")),
                field("database"),
            )
        }
        _ => (None, None),
    };

    let uri = uri.ok_or_else(|| missing("connection_string"))?;
    let database = match database {
        Some(db) => db,
        None => params
            .get_non_empty_str("database")?
            .map(str::to_string)
            .ok_or_else(|| missing("database"))?,
    };
    Ok((uri, database))
}

/// MongoDB operation with its JSON arguments decoded
#[derive(Debug, Clone, PartialEq)]
enum MongoQuery {
    Find(serde_json::Value),
    Insert(Vec<serde_json::Value>),
    Update {
        filter: serde_json::Value,
        update: serde_json::Value,
    },
    Delete(serde_json::Value),
}

fn mongo_query(query: &str, operation: Operation) -> Result<MongoQuery, NodeError> {
    let invalid = |reason: &str| NodeError::invalid_param("query", reason.to_string());
    let parsed: serde_json::Value =
        serde_json::from_str(query).map_err(|e| invalid(&format!("not valid JSON: {}", e)))?;

    match operation {
        Operation::Select => match parsed {
            serde_json::Value::Object(_) => Ok(MongoQuery::Find(parsed)),
            _ => Err(invalid("find filter must be an object")),
        },
        Operation::Insert => match parsed {
            serde_json::Value::Array(docs) if docs.iter().all(|d| d.is_object()) && !docs.is_empty() => {
                Ok(MongoQuery::Insert(docs))
            }
            serde_json::Value::Object(_) => Ok(MongoQuery::Insert(vec![parsed])),
            _ => Err(invalid("insert expects an object or a non-empty array of objects")),
        },
        Operation::Update => {
            let filter = parsed.get("filter").cloned().filter(|f| f.is_object());
            let update = parsed.get("update").cloned().filter(|u| u.is_object());
            match (filter, update) {
                (Some(filter), Some(update)) => Ok(MongoQuery::Update { filter, update }),
                _ => Err(invalid("update expects {\"filter\": {...}, \"update\": {...}}")),
            }
        }
        Operation::Delete => match parsed {
            serde_json::Value::Object(_) => Ok(MongoQuery::Delete(parsed)),
            _ => Err(invalid("delete filter must be an object")),
        },
    }
}

fn db_error(e: impl fmt::Display) -> NodeError {
    NodeError::ExecutionFailed(format!("Database error: {}", e))
}

fn to_document(value: &serde_json::Value) -> Result<Document, NodeError> {
    bson::to_document(value).map_err(|e| NodeError::invalid_param("query", e.to_string()))
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(n) => query.bind(*n),
        Value::Number(n) => query.bind(*n),
        Value::String(s) => query.bind(s.clone()),
        // rejected when params are parsed
        Value::Array(_) | Value::Object(_) => query.bind(value.to_json().to_string()),
    }
}

/// Decode one column into a `Value`, trying the scalar types the `Any`
/// driver can carry.
fn column_value(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(|n| Value::from(i64::from(n))).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
        return v.map(|n| Value::from(i64::from(n))).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return v.map(|n| Value::from(f64::from(n))).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    Value::Null
}

async fn run_sql(url: &str, options: &DatabaseParams) -> Result<Value, NodeError> {
    sqlx::any::install_default_drivers();
    let mut conn = AnyConnection::connect(url).await.map_err(db_error)?;

    let query = options
        .parameters
        .iter()
        .fold(sqlx::query::<Any>(&options.query), bind_value);

    let mut result = BTreeMap::new();
    match options.operation {
        Operation::Select => {
            let rows = query.fetch_all(&mut conn).await.map_err(db_error)?;
            let columns: Vec<String> = rows
                .first()
                .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();

            let data: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let record: BTreeMap<String, Value> = columns
                        .iter()
                        .enumerate()
                        .map(|(i, name)| (name.clone(), column_value(row, i)))
                        .collect();
                    Value::Object(record)
                })
                .collect();

            result.insert(
                "columns".to_string(),
                Value::Array(columns.into_iter().map(Value::from).collect()),
            );
            result.insert("data".to_string(), Value::Array(data));
        }
        _ => {
            let done = query.execute(&mut conn).await.map_err(db_error)?;
            result.insert("rows_affected".to_string(), Value::from(done.rows_affected()));
        }
    }

    if let Err(e) = conn.close().await {
        tracing::warn!("closing database connection failed: {}", e);
    }
    Ok(Value::Object(result))
}

async fn run_mongo(
    uri: &str,
    database: &str,
    collection: &str,
    operation: Operation,
    query: &str,
) -> Result<Value, NodeError> {
    let client = mongodb::Client::with_uri_str(uri).await.map_err(db_error)?;
    let coll = client.database(database).collection::<Document>(collection);

    let mut result = BTreeMap::new();
    match mongo_query(query, operation)? {
        MongoQuery::Find(filter) => {
            let cursor = coll.find(to_document(&filter)?).await.map_err(db_error)?;
            let docs: Vec<Document> = cursor.try_collect().await.map_err(db_error)?;
            let data = docs
                .into_iter()
                .map(|doc| Value::from(Bson::Document(doc).into_relaxed_extjson()))
                .collect();
            result.insert("data".to_string(), Value::Array(data));
        }
        MongoQuery::Insert(docs) => {
            let docs = docs.iter().map(to_document).collect::<Result<Vec<_>, _>>()?;
            let inserted = coll.insert_many(docs).await.map_err(db_error)?;
            let mut ids: Vec<(usize, Bson)> = inserted.inserted_ids.into_iter().collect();
            ids.sort_by_key(|(i, _)| *i);
            result.insert(
                "inserted_ids".to_string(),
                Value::Array(
                    ids.into_iter()
                        .map(|(_, id)| Value::from(id.into_relaxed_extjson()))
                        .collect(),
                ),
            );
        }
        MongoQuery::Update { filter, update } => {
            let updated = coll
                .update_many(to_document(&filter)?, to_document(&update)?)
                .await
                .map_err(db_error)?;
            result.insert("modified_count".to_string(), Value::from(updated.modified_count));
        }
        MongoQuery::Delete(filter) => {
            let deleted = coll.delete_many(to_document(&filter)?).await.map_err(db_error)?;
            result.insert("deleted_count".to_string(), Value::from(deleted.deleted_count));
        }
    }
    Ok(Value::Object(result))
}

/// Number of rows or documents an operation touched
fn affected(result: &Value) -> u64 {
    ["rows_affected", "modified_count", "deleted_count"]
        .iter()
        .find_map(|key| result.get(key).and_then(Value::as_u64))
        .or_else(|| {
            ["data", "inserted_ids"]
                .iter()
                .find_map(|key| result.get(key).and_then(Value::as_array).map(|a| a.len() as u64))
        })
        .unwrap_or(0)
}

pub struct DatabaseNode;

#[async_trait]
impl Node for DatabaseNode {
    fn node_type(&self) -> &str {
        "database"
    }

    async fn execute(&self, ctx: &NodeContext, state: &mut State) -> Result<(), NodeError> {
        let options = DatabaseParams::from_params(&ctx.params)?;
        let credential = state
            .api_keys()
            .get(options.db_type.credential_key())
            .cloned()
            .ok_or_else(|| NodeError::MissingCredential(options.db_type.credential_key().to_string()))?;

        ctx.events.info(format!(
            "Running {} on {}",
            options.operation.as_str(),
            options.db_type
        ));

        let outcome = match options.db_type {
            DbType::Postgresql | DbType::Mysql => {
                let url = sql_url(options.db_type, &credential)?;
                run_sql(&url, &options).await
            }
            DbType::Mongodb => {
                let (uri, database) = mongo_target(&credential, &ctx.params)?;
                let collection = options.collection.as_deref().unwrap_or_default();
                run_mongo(&uri, &database, collection, options.operation, &options.query).await
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                state.set_error(e.detail());
                return Err(e);
            }
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("db_type".to_string(), Value::from(options.db_type.credential_key()));
        metadata.insert("operation".to_string(), Value::from(options.operation.as_str()));
        metadata.insert("rows_affected".to_string(), Value::from(affected(&result)));
        state.set_extra("db_metadata", Value::Object(metadata));
        state.set_output(result);
        Ok(())
    }

    fn validate_params(&self, params: &NodeParams) -> Result<(), NodeError> {
        DatabaseParams::from_params(params).map(|_| ())
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Run a query against PostgreSQL, MySQL or MongoDB".to_string(),
            category: "data".to_string(),
            params: vec![
                ParamDefinition::optional("db_type", "postgresql (default), mysql or mongodb"),
                ParamDefinition::optional("operation", "select (default), insert, update or delete"),
                ParamDefinition::required("query", "SQL statement, or JSON filter/document for MongoDB"),
                ParamDefinition::optional("parameters", "Positional values bound to SQL placeholders"),
                ParamDefinition::optional("collection", "MongoDB collection (required for mongodb)"),
                ParamDefinition::optional("database", "MongoDB database when not in the credential"),
            ],
        }
    }
}
