//! Command handlers.
//!
//! The handler is transport-agnostic: it takes an [`Operation`] plus JSON
//! parameters and produces a status and JSON body. Routing from HTTP lives in
//! [`crate::server`].

use crate::error::ServerError;
use crate::metrics::Metrics;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;
use wfengine_core::{Definition, WorkflowEngine};

/// Operations understood by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateDefinition,
    GetDefinition,
    ListDefinitions,
    StartInstance,
    GetInstance,
    ListInstances,
    ExecuteAction,
    ListActions,
}

impl Operation {
    /// Returns the name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateDefinition => "CREATE_DEFINITION",
            Operation::GetDefinition => "GET_DEFINITION",
            Operation::ListDefinitions => "LIST_DEFINITIONS",
            Operation::StartInstance => "START_INSTANCE",
            Operation::GetInstance => "GET_INSTANCE",
            Operation::ListInstances => "LIST_INSTANCES",
            Operation::ExecuteAction => "EXECUTE_ACTION",
            Operation::ListActions => "LIST_ACTIONS",
        }
    }
}

/// A decoded request.
#[derive(Debug, Clone)]
pub struct Request {
    pub op: Operation,
    pub params: Value,
}

impl Request {
    pub fn new(op: Operation, params: Value) -> Self {
        Self { op, params }
    }
}

/// Handler output.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Value,
    /// Path of a newly created resource.
    pub location: Option<String>,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            location: None,
        }
    }

    pub fn created(body: Value, location: String) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
            location: Some(location),
        }
    }

    pub fn error(err: &ServerError) -> Self {
        Self {
            status: err.status(),
            body: err.to_body(),
            location: None,
        }
    }

    /// Returns true for 2xx responses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Deserialize)]
struct GetDefinitionParams {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartInstanceParams {
    definition_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceParams {
    instance_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInstancesParams {
    #[serde(default)]
    definition_id: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteActionParams {
    instance_id: String,
    action_id: String,
}

fn parse_params<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T, ServerError> {
    serde_json::from_value(params.clone()).map_err(|e| ServerError::InvalidRequest(e.to_string()))
}

fn parse_instance_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw)
        .map_err(|_| ServerError::InvalidRequest(format!("'{}' is not a valid instance id", raw)))
}

/// Executes operations against a [`WorkflowEngine`].
pub struct CommandHandler {
    engine: Arc<WorkflowEngine>,
    metrics: Option<Arc<Metrics>>,
}

impl CommandHandler {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// Returns a reference to the metrics, if set.
    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Updates gauge metrics from current engine state.
    pub fn update_gauge_metrics(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics
                .definitions_total
                .set(self.engine.definition_count() as f64);
            metrics
                .instances_total
                .set(self.engine.instance_count() as f64);
        }
    }

    /// Handles a request and returns a response.
    pub fn handle(&self, request: &Request) -> Response {
        let op_name = request.op.name();

        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[op_name])
                .start_timer()
        });

        let result = match request.op {
            Operation::CreateDefinition => self.handle_create_definition(&request.params),
            Operation::GetDefinition => self.handle_get_definition(&request.params),
            Operation::ListDefinitions => self.handle_list_definitions(),
            Operation::StartInstance => self.handle_start_instance(&request.params),
            Operation::GetInstance => self.handle_get_instance(&request.params),
            Operation::ListInstances => self.handle_list_instances(&request.params),
            Operation::ExecuteAction => self.handle_execute_action(&request.params),
            Operation::ListActions => self.handle_list_actions(&request.params),
        };

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[op_name]).inc();
            if let Err(ref e) = result {
                metrics.errors_total.with_label_values(&[e.code()]).inc();
            }
        }
        drop(timer);

        match result {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("{} failed: {}", op_name, e);
                Response::error(&e)
            }
        }
    }

    fn handle_create_definition(&self, params: &Value) -> Result<Response, ServerError> {
        let definition = Definition::from_json(params)
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

        let definition = self.engine.create_definition(definition)?;
        self.update_gauge_metrics();

        let location = format!("/definitions/{}", urlencoding::encode(&definition.id));
        Ok(Response::created(definition.to_json(), location))
    }

    fn handle_get_definition(&self, params: &Value) -> Result<Response, ServerError> {
        let p: GetDefinitionParams = parse_params(params)?;
        let definition = self.engine.get_definition(&p.id)?;
        Ok(Response::ok(definition.to_json()))
    }

    fn handle_list_definitions(&self) -> Result<Response, ServerError> {
        let items: Vec<Value> = self
            .engine
            .list_definitions()
            .iter()
            .map(|d| d.to_json())
            .collect();

        Ok(Response::ok(json!({ "items": items })))
    }

    fn handle_start_instance(&self, params: &Value) -> Result<Response, ServerError> {
        let p: StartInstanceParams = parse_params(params)?;
        let instance = self.engine.start_instance(&p.definition_id)?;
        self.update_gauge_metrics();

        let location = format!("/instances/{}", instance.id);
        Ok(Response::created(serde_json::to_value(&instance)?, location))
    }

    fn handle_get_instance(&self, params: &Value) -> Result<Response, ServerError> {
        let p: InstanceParams = parse_params(params)?;
        let instance = self.engine.get_instance(&parse_instance_id(&p.instance_id)?)?;
        Ok(Response::ok(serde_json::to_value(&instance)?))
    }

    fn handle_list_instances(&self, params: &Value) -> Result<Response, ServerError> {
        let p: ListInstancesParams = if params.is_null() {
            ListInstancesParams::default()
        } else {
            parse_params(params)?
        };

        let instances = self
            .engine
            .list_instances(p.definition_id.as_deref(), p.state.as_deref());
        let total = instances.len();

        Ok(Response::ok(json!({
            "items": serde_json::to_value(&instances)?,
            "total": total,
        })))
    }

    fn handle_execute_action(&self, params: &Value) -> Result<Response, ServerError> {
        let p: ExecuteActionParams = parse_params(params)?;
        let instance_id = parse_instance_id(&p.instance_id)?;

        let instance = self.engine.execute_action(&instance_id, &p.action_id)?;
        if let Some(ref metrics) = self.metrics {
            metrics.transitions_total.inc();
        }

        Ok(Response::ok(serde_json::to_value(&instance)?))
    }

    fn handle_list_actions(&self, params: &Value) -> Result<Response, ServerError> {
        let p: InstanceParams = parse_params(params)?;
        let actions = self
            .engine
            .available_actions(&parse_instance_id(&p.instance_id)?)?;

        Ok(Response::ok(json!({ "items": serde_json::to_value(&actions)? })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfengine_core::MemoryRepository;

    fn test_handler() -> CommandHandler {
        let engine = WorkflowEngine::new(Arc::new(MemoryRepository::new()));
        CommandHandler::new(Arc::new(engine)).with_metrics(Arc::new(Metrics::new().unwrap()))
    }

    fn call(handler: &CommandHandler, op: Operation, params: Value) -> Response {
        handler.handle(&Request::new(op, params))
    }

    fn doc_approval() -> Value {
        json!({
            "id": "doc-approval",
            "states": [
                {"id": "draft", "isInitial": true},
                {"id": "review"},
                {"id": "approved", "isFinal": true}
            ],
            "actions": [
                {"id": "submit", "fromStates": ["draft"], "toState": "review"},
                {"id": "approve", "fromStates": ["review"], "toState": "approved"}
            ]
        })
    }

    fn start(handler: &CommandHandler) -> String {
        call(handler, Operation::CreateDefinition, doc_approval());
        let response = call(
            handler,
            Operation::StartInstance,
            json!({"definitionId": "doc-approval"}),
        );
        response.body["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_create_definition() {
        let handler = test_handler();
        let response = call(&handler, Operation::CreateDefinition, doc_approval());

        assert!(response.is_success());
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(handler.engine().definition_count(), 1);
        assert_eq!(response.location.as_deref(), Some("/definitions/doc-approval"));
        assert_eq!(response.body["states"][0]["isInitial"], true);
        assert_eq!(response.body["actions"][0]["enabled"], true);
    }

    #[test]
    fn test_location_escapes_definition_id() {
        let handler = test_handler();
        let mut def = doc_approval();
        def["id"] = json!("doc/approval v1");

        let response = call(&handler, Operation::CreateDefinition, def);
        assert_eq!(
            response.location.as_deref(),
            Some("/definitions/doc%2Fapproval%20v1")
        );
    }

    #[test]
    fn test_two_initial_states_rejected() {
        let handler = test_handler();
        let mut def = doc_approval();
        def["states"][1]["isInitial"] = json!(true);

        let response = call(&handler, Operation::CreateDefinition, def);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["code"], "INVALID_INITIAL_STATE_COUNT");
        assert!(response.body["message"]
            .as_str()
            .unwrap()
            .contains("Found 2"));
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let handler = test_handler();
        call(&handler, Operation::CreateDefinition, doc_approval());
        let response = call(&handler, Operation::CreateDefinition, doc_approval());

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["code"], "DUPLICATE_DEFINITION_ID");
    }

    #[test]
    fn test_malformed_definition_is_bad_request() {
        let handler = test_handler();
        let response = call(&handler, Operation::CreateDefinition, json!({"states": []}));

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["code"], "BAD_REQUEST");
    }

    #[test]
    fn test_get_definition_not_found() {
        let handler = test_handler();
        let response = call(&handler, Operation::GetDefinition, json!({"id": "missing"}));

        assert!(!response.is_success());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["code"], "DEFINITION_NOT_FOUND");
    }

    #[test]
    fn test_start_instance_unknown_definition() {
        let handler = test_handler();
        let response = call(
            &handler,
            Operation::StartInstance,
            json!({"definitionId": "missing"}),
        );
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_doc_approval_flow() {
        let handler = test_handler();
        let id = start(&handler);

        let response = call(
            &handler,
            Operation::ExecuteAction,
            json!({"instanceId": id, "actionId": "submit"}),
        );
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["currentState"], "review");

        let response = call(
            &handler,
            Operation::ExecuteAction,
            json!({"instanceId": id, "actionId": "approve"}),
        );
        assert_eq!(response.body["currentState"], "approved");
        assert_eq!(response.body["history"].as_array().unwrap().len(), 2);
        assert_eq!(response.body["history"][1]["fromState"], "review");

        let response = call(
            &handler,
            Operation::ExecuteAction,
            json!({"instanceId": id, "actionId": "submit"}),
        );
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["code"], "INSTANCE_IN_FINAL_STATE");

        let metrics = handler.metrics().unwrap();
        assert_eq!(metrics.transitions_total.get(), 2.0);
        assert_eq!(metrics.instances_total.get(), 1.0);
    }

    #[test]
    fn test_rejected_action_leaves_instance_unchanged() {
        let handler = test_handler();
        let id = start(&handler);

        let response = call(
            &handler,
            Operation::ExecuteAction,
            json!({"instanceId": id, "actionId": "approve"}),
        );
        assert_eq!(response.body["code"], "INVALID_SOURCE_STATE");

        let response = call(&handler, Operation::GetInstance, json!({"instanceId": id}));
        assert_eq!(response.body["currentState"], "draft");
        assert!(response.body["history"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_instance_id_errors() {
        let handler = test_handler();

        let response = call(
            &handler,
            Operation::GetInstance,
            json!({"instanceId": "not-a-uuid"}),
        );
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = call(
            &handler,
            Operation::GetInstance,
            json!({"instanceId": Uuid::new_v4().to_string()}),
        );
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["code"], "INSTANCE_NOT_FOUND");
    }

    #[test]
    fn test_list_instances_and_actions() {
        let handler = test_handler();
        let first = start(&handler);
        let second = call(
            &handler,
            Operation::StartInstance,
            json!({"definitionId": "doc-approval"}),
        );
        let second = second.body["id"].as_str().unwrap().to_string();
        call(
            &handler,
            Operation::ExecuteAction,
            json!({"instanceId": second, "actionId": "submit"}),
        );

        let response = call(&handler, Operation::ListInstances, json!({"state": "draft"}));
        assert_eq!(response.body["total"], 1);
        assert_eq!(response.body["items"][0]["id"], first.as_str());

        let response = call(&handler, Operation::ListInstances, Value::Null);
        assert_eq!(response.body["total"], 2);

        let response = call(&handler, Operation::ListActions, json!({"instanceId": second}));
        let items = response.body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "approve");
    }

    #[test]
    fn test_errors_counted_by_code() {
        let handler = test_handler();
        call(&handler, Operation::GetDefinition, json!({"id": "missing"}));

        let metrics = handler.metrics().unwrap();
        assert_eq!(
            metrics
                .errors_total
                .with_label_values(&["DEFINITION_NOT_FOUND"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics
                .requests_total
                .with_label_values(&["GET_DEFINITION"])
                .get(),
            1.0
        );
    }
}
