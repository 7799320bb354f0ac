use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use routeguard_schema::JsonSchemaConfig;
use routeguard_validate::{
    validate_input, validate_response_with_rng, ConnectionSettings, Handlers, HttpError,
    LogEvent, MemoryLogger, Next, Request, Response, RoutePolicy, Source, Variety,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cmd::{read_json, SimulateArgs};
use crate::exit::{io_error, json_error, policy_error, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{print_simulation, OutputFormat};

/// Request data fed through the route's validators.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestFixture {
    headers: Option<Value>,
    params: Option<Value>,
    query: Option<Value>,
    payload: Option<Value>,
    connection: ConnectionSettings,
    response: Option<ResponseFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseFixture {
    #[serde(default = "default_status")]
    status_code: u16,
    #[serde(default)]
    variety: Variety,
    #[serde(default)]
    source: Value,
}

fn default_status() -> u16 {
    200
}

impl RequestFixture {
    fn into_request(self, route: Arc<RoutePolicy>, logger: Arc<MemoryLogger>) -> Request {
        let mut request = Request::new(route)
            .with_logger(logger)
            .with_connection(Arc::new(self.connection));
        let buckets = [
            (Source::Headers, self.headers),
            (Source::Params, self.params),
            (Source::Query, self.query),
            (Source::Payload, self.payload),
        ];
        for (source, value) in buckets {
            if let Some(value) = value {
                *request.bucket_mut(source) = value;
            }
        }
        if let Some(response) = self.response {
            request.response = Some(Response::Plain {
                status_code: response.status_code,
                variety: response.variety,
                source: response.source,
            });
        }
        request
    }
}

/// What happened at each lifecycle stage, plus the request as it ended up.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<Step>,
    pub request: Map<String, Value>,
    pub orig: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    pub events: Vec<LogEvent>,
}

#[derive(Debug, Serialize)]
pub struct Step {
    pub stage: &'static str,
    /// `continue`, `error` or `respond`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Step {
    fn passed(stage: &'static str) -> Self {
        Self {
            stage,
            outcome: "continue",
            status: None,
            message: None,
            body: None,
        }
    }

    fn failed(stage: &'static str, error: &HttpError) -> Self {
        Self {
            stage,
            outcome: "error",
            status: Some(error.status_code()),
            message: Some(error.message.clone()),
            body: Some(error.output.payload.clone()),
        }
    }

    fn took_over(stage: &'static str, response: &Response) -> Self {
        Self {
            stage,
            outcome: "respond",
            status: Some(response.status_code()),
            message: None,
            body: Some(response.body().clone()),
        }
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let route_config = read_json(&args.route)?;
    let fixture: RequestFixture = serde_json::from_value(read_json(&args.request)?)
        .map_err(|err| json_error("invalid request fixture", err))?;

    let json = JsonSchemaConfig {
        strict_mode: args.strict,
        ..JsonSchemaConfig::default()
    };
    let policy = RoutePolicy::from_config(&route_config, &Handlers::new(), &json)
        .map_err(|err| policy_error("invalid route", err))?;

    let logger = Arc::new(MemoryLogger::new());
    let mut request = fixture.into_request(Arc::new(policy), logger.clone());
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|err| io_error("failed starting runtime", err))?;
    let (steps, code) = runtime.block_on(lifecycle(&mut request, &mut rng));

    let report = SimulationReport {
        steps,
        request: Source::ALL
            .into_iter()
            .map(|source| (source.to_string(), request.bucket(source).clone()))
            .collect(),
        orig: Source::ALL
            .into_iter()
            .filter_map(|source| {
                request
                    .orig
                    .get(source)
                    .map(|value| (source.to_string(), value.clone()))
            })
            .collect(),
        response: request.response.as_ref().map(|response| response.body().clone()),
        events: logger.events(),
    };
    print_simulation(&report, format);
    Ok(code)
}

/// Headers, params, query, payload, then the response; stops at the first
/// stage that does not continue.
async fn lifecycle<R: Rng>(request: &mut Request, rng: &mut R) -> (Vec<Step>, i32) {
    let mut steps = Vec::new();

    for source in Source::ALL {
        match validate_input(source, request).await {
            Ok(Next::Continue) => record(&mut steps, Step::passed(source.as_str())),
            Ok(Next::Respond(response)) => {
                record(&mut steps, Step::took_over(source.as_str(), &response));
                return (steps, SUCCESS);
            }
            Err(error) => {
                record(&mut steps, Step::failed(source.as_str(), &error));
                return (steps, DATA_INVALID);
            }
        }
    }

    if request.response.is_none() {
        return (steps, SUCCESS);
    }
    match validate_response_with_rng(request, rng).await {
        Ok(()) => {
            record(&mut steps, Step::passed("response"));
            (steps, SUCCESS)
        }
        Err(error) => {
            record(&mut steps, Step::failed("response", &error));
            (steps, FAILURE)
        }
    }
}

fn record(steps: &mut Vec<Step>, step: Step) {
    debug!(stage = step.stage, outcome = step.outcome, status = ?step.status, "lifecycle stage");
    steps.push(step);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn route(config: Value) -> Arc<RoutePolicy> {
        let policy = RoutePolicy::from_config(&config, &Handlers::new(), &JsonSchemaConfig::default())
            .expect("route config should build");
        Arc::new(policy)
    }

    #[test]
    fn fixture_fills_buckets_and_response() {
        let fixture: RequestFixture = serde_json::from_value(json!({
            "query": { "page": "2" },
            "connection": { "validation": { "abortEarly": true } },
            "response": { "source": { "id": 1 } }
        }))
        .expect("fixture should parse");

        let request = fixture.into_request(route(json!({})), Arc::new(MemoryLogger::new()));
        assert_eq!(request.query, json!({ "page": "2" }));
        assert_eq!(request.payload, Value::Null);
        assert_eq!(request.response.as_ref().map(Response::status_code), Some(200));
        assert!(request
            .connection
            .validation
            .as_ref()
            .is_some_and(|options| options.abort_early));
    }

    #[tokio::test]
    async fn lifecycle_stops_at_first_rejected_source() {
        let policy = route(json!({
            "validate": {
                "params": { "type": "object", "required": ["id"] },
                "payload": { "type": "object", "required": ["name"] }
            }
        }));
        let mut request = Request::new(policy).with_logger(Arc::new(MemoryLogger::new()));
        let mut rng = StdRng::seed_from_u64(1);

        let (steps, code) = lifecycle(&mut request, &mut rng).await;
        assert_eq!(code, DATA_INVALID);
        let stages: Vec<_> = steps.iter().map(|step| (step.stage, step.outcome)).collect();
        assert_eq!(stages, vec![("headers", "continue"), ("params", "error")]);
        assert_eq!(steps[1].status, Some(400));
    }

    #[tokio::test]
    async fn response_failure_is_reported_as_internal() {
        let policy = route(json!({
            "response": { "schema": { "type": "object", "required": ["id"] } }
        }));
        let mut request = Request::new(policy).with_response(Response::plain(200, json!({})));
        let mut rng = StdRng::seed_from_u64(1);

        let (steps, code) = lifecycle(&mut request, &mut rng).await;
        assert_eq!(code, FAILURE);
        let last = steps.last().expect("response step");
        assert_eq!(last.stage, "response");
        assert_eq!(last.status, Some(500));
    }
}
