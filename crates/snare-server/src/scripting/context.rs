//! Engine construction and single-invocation execution.
//!
//! One handler invocation is synchronous and non-preemptible: it runs to
//! completion or throws. Callers may inject a cancellation flag which is
//! checked from the engine progress hook, but no limit is imposed here.

use super::console::ScriptConsole;
use super::{
    dynamic_to_json, format_script_error, json_to_dynamic, ResponseState, ScriptOutcome,
    ScriptRequest,
};
use crate::auth::{
    generate_signature, parse_authorization_header, parse_signature_header, verify_hmac,
    verify_jwt, HmacAlgorithm, JwtVerification,
};
use crate::model::JwksConfig;
use once_cell::sync::OnceCell;
use rhai::{Blob, Dynamic, Engine, EvalAltResult, Map, Position, Scope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Inputs for the lazy `jwt.*` bindings: the exchange's Authorization
/// header and the handler's JWKS configuration.
#[derive(Clone, Default)]
pub struct JwtEnv {
    pub auth_header: Option<String>,
    pub jwks: Option<JwksConfig>,
}

/// `resp` binding: a handle onto the exchange's shared response state.
#[derive(Clone)]
struct ScriptResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl ScriptResponse {
    fn lock(&self) -> std::sync::MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get_status(&mut self) -> i64 {
        i64::from(self.lock().status)
    }

    fn set_status(&mut self, status: i64) {
        self.lock().status = status.clamp(100, 999) as u16;
    }

    fn get_body(&mut self) -> Dynamic {
        match &self.lock().body {
            Some(bytes) => Dynamic::from(String::from_utf8_lossy(bytes).into_owned()),
            None => Dynamic::UNIT,
        }
    }

    fn set_body_text(&mut self, body: String) {
        self.lock().body = Some(body.into_bytes());
    }

    fn set_body_map(&mut self, body: Map) {
        let json = serde_json::to_string(&dynamic_to_json(Dynamic::from(body)))
            .unwrap_or_else(|_| "{}".to_string());
        self.lock().body = Some(json.into_bytes());
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.lock().set_header(name, value);
    }

    fn get_header(&mut self, name: &str) -> Dynamic {
        match self.lock().header(name) {
            Some(value) => Dynamic::from(value.to_string()),
            None => Dynamic::UNIT,
        }
    }

    fn write_bytes(&mut self, data: Blob) {
        self.lock().tcp_writes.push(data);
    }

    fn write_text(&mut self, data: &str) {
        self.lock().tcp_writes.push(data.as_bytes().to_vec());
    }
}

/// `jwt` binding: verification runs once, on the first call, and is
/// memoized for the rest of the invocation.
#[derive(Clone)]
struct ScriptJwt {
    env: Arc<JwtEnv>,
    outcome: Arc<OnceCell<JwtVerification>>,
}

impl ScriptJwt {
    fn new(env: JwtEnv) -> Self {
        Self {
            env: Arc::new(env),
            outcome: Arc::new(OnceCell::new()),
        }
    }

    fn resolve(&self) -> &JwtVerification {
        self.outcome.get_or_init(|| {
            let jwks = match &self.env.jwks {
                Some(jwks) => jwks,
                None => {
                    return JwtVerification {
                        is_valid: false,
                        algorithm: None,
                        key_id: None,
                        error: Some("No JWKS configured for this handler".to_string()),
                    }
                }
            };
            let parsed = parse_authorization_header(self.env.auth_header.as_deref().unwrap_or(""));
            verify_jwt(&parsed, jwks)
        })
    }

    fn is_verified(&mut self) -> bool {
        self.resolve().is_valid
    }

    fn algorithm(&mut self) -> Dynamic {
        opt_string(self.resolve().algorithm.clone())
    }

    fn key_id(&mut self) -> Dynamic {
        opt_string(self.resolve().key_id.clone())
    }

    fn error(&mut self) -> Dynamic {
        opt_string(self.resolve().error.clone())
    }

    fn require_verified(&mut self) -> Result<(), Box<EvalAltResult>> {
        let outcome = self.resolve();
        if outcome.is_valid {
            return Ok(());
        }
        let message = outcome
            .error
            .clone()
            .unwrap_or_else(|| "JWT signature verification failed".to_string());
        Err(EvalAltResult::ErrorRuntime(Dynamic::from(message), Position::NONE).into())
    }
}

/// `hmac` binding over the exchange body.
#[derive(Clone)]
struct ScriptHmac {
    body: Arc<Vec<u8>>,
}

impl ScriptHmac {
    fn verify(&mut self, signature_header: &str, secret: &str) -> Map {
        let parsed = parse_signature_header(signature_header);
        let result = verify_hmac(&parsed, &self.body, secret);

        let mut map = Map::new();
        map.insert("isValid".into(), Dynamic::from(result.is_valid));
        map.insert(
            "expectedSignature".into(),
            opt_string(result.expected_signature),
        );
        map.insert(
            "actualSignature".into(),
            opt_string(result.actual_signature),
        );
        map.insert("algorithm".into(), Dynamic::from(result.algorithm));
        map.insert("error".into(), opt_string(result.error));
        map
    }

    fn generate(
        &mut self,
        payload: &str,
        secret: &str,
        algorithm: &str,
    ) -> Result<String, Box<EvalAltResult>> {
        match HmacAlgorithm::from_name(algorithm) {
            Some(algorithm) => Ok(generate_signature(payload.as_bytes(), secret, algorithm)),
            None => Err(EvalAltResult::ErrorRuntime(
                Dynamic::from(format!("Unsupported HMAC algorithm: {algorithm}")),
                Position::NONE,
            )
            .into()),
        }
    }
}

fn opt_string(value: Option<String>) -> Dynamic {
    match value {
        Some(s) => Dynamic::from(s),
        None => Dynamic::UNIT,
    }
}

fn string_map(entries: impl IntoIterator<Item = (String, String)>) -> Map {
    let mut map = Map::new();
    for (k, v) in entries {
        map.insert(k.into(), Dynamic::from(v));
    }
    map
}

fn request_to_map(request: &ScriptRequest) -> Map {
    let mut map = Map::new();
    map.insert("method".into(), opt_string(request.method.clone()));
    map.insert("url".into(), opt_string(request.url.clone()));
    map.insert("path".into(), opt_string(request.path.clone()));
    map.insert(
        "remote_addr".into(),
        opt_string(request.remote_addr.clone()),
    );
    map.insert(
        "params".into(),
        Dynamic::from(string_map(request.params.clone())),
    );
    map.insert(
        "query".into(),
        Dynamic::from(string_map(request.query.clone())),
    );
    // Header names are lowercased so scripts can index them predictably.
    map.insert(
        "headers".into(),
        Dynamic::from(string_map(
            request
                .headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone())),
        )),
    );
    map.insert(
        "body".into(),
        match &request.body {
            Some(bytes) => Dynamic::from(String::from_utf8_lossy(bytes).into_owned()),
            None => Dynamic::UNIT,
        },
    );
    if let Some(bytes) = &request.tcp_bytes {
        map.insert("bytes".into(), Dynamic::from_blob(bytes.clone()));
    }
    map
}

macro_rules! register_console_level {
    ($engine:expr, $name:literal, $level:literal) => {
        $engine
            .register_fn($name, |c: &mut ScriptConsole, a: Dynamic| {
                c.append($level, &[a])
            })
            .register_fn($name, |c: &mut ScriptConsole, a: Dynamic, b: Dynamic| {
                c.append($level, &[a, b])
            })
            .register_fn(
                $name,
                |c: &mut ScriptConsole, a: Dynamic, b: Dynamic, d: Dynamic| {
                    c.append($level, &[a, b, d])
                },
            )
            .register_fn(
                $name,
                |c: &mut ScriptConsole, a: Dynamic, b: Dynamic, d: Dynamic, e: Dynamic| {
                    c.append($level, &[a, b, d, e])
                },
            );
    };
}

fn build_engine(cancel: Option<Arc<AtomicBool>>) -> Engine {
    let mut engine = Engine::new();

    engine
        .register_type_with_name::<ScriptResponse>("Response")
        .register_get_set(
            "status",
            ScriptResponse::get_status,
            ScriptResponse::set_status,
        )
        .register_get("body", ScriptResponse::get_body)
        .register_set("body", ScriptResponse::set_body_text)
        .register_set("body", ScriptResponse::set_body_map)
        .register_fn("set_header", ScriptResponse::set_header)
        .register_fn("get_header", ScriptResponse::get_header)
        .register_fn("write", ScriptResponse::write_bytes)
        .register_fn("write", ScriptResponse::write_text);

    engine.register_type_with_name::<ScriptConsole>("Console");
    register_console_level!(engine, "log", "LOG");
    register_console_level!(engine, "info", "INFO");
    register_console_level!(engine, "warn", "WARN");
    register_console_level!(engine, "error", "ERROR");
    register_console_level!(engine, "debug", "DEBUG");

    engine
        .register_type_with_name::<ScriptJwt>("Jwt")
        .register_fn("isJWTVerified", ScriptJwt::is_verified)
        .register_fn("getJWTAlgorithm", ScriptJwt::algorithm)
        .register_fn("getJWTKeyId", ScriptJwt::key_id)
        .register_fn("getJWTError", ScriptJwt::error)
        .register_fn("requireJWTVerification", ScriptJwt::require_verified);

    engine
        .register_type_with_name::<ScriptHmac>("Hmac")
        .register_fn("verify", ScriptHmac::verify)
        .register_fn("generate", ScriptHmac::generate);

    engine.register_fn("parse_json", |text: &str| -> Dynamic {
        serde_json::from_str::<serde_json::Value>(text)
            .map(json_to_dynamic)
            .unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("to_json", |value: Dynamic| -> String {
        serde_json::to_string(&dynamic_to_json(value)).unwrap_or_else(|_| "null".to_string())
    });

    if let Some(flag) = cancel {
        engine.on_progress(move |_| {
            flag.load(Ordering::Relaxed)
                .then(|| Dynamic::from("cancelled"))
        });
    }

    engine
}

/// Execute one handler's source with the sandbox bindings in scope.
///
/// Returns normally or with a formatted error; either way the console
/// buffer and the `locals` map reflect everything the script did before
/// finishing, and `resp` mutations already applied are retained.
pub fn execute_handler_script(
    code: &str,
    request: &ScriptRequest,
    response: Arc<Mutex<ResponseState>>,
    locals: Map,
    jwt_env: JwtEnv,
    cancel: Option<Arc<AtomicBool>>,
) -> ScriptOutcome {
    let engine = build_engine(cancel);
    let console = ScriptConsole::new();

    let ast = match engine.compile(code) {
        Ok(ast) => ast,
        Err(e) => {
            return ScriptOutcome {
                result: Err(format!("SyntaxError: {e}")),
                console_output: None,
                locals,
            }
        }
    };

    let body = request
        .tcp_bytes
        .clone()
        .or_else(|| request.body.clone())
        .unwrap_or_default();

    let mut scope = Scope::new();
    scope.push_constant("req", request_to_map(request));
    scope.push("resp", ScriptResponse { state: response });
    scope.push("console", console.clone());
    scope.push("locals", locals.clone());
    scope.push("jwt", ScriptJwt::new(jwt_env));
    scope.push(
        "hmac",
        ScriptHmac {
            body: Arc::new(body),
        },
    );

    let result = engine
        .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
        .map(|_| ())
        .map_err(|e| format_script_error(&e));

    let locals = scope.get_value::<Map>("locals").unwrap_or(locals);

    ScriptOutcome {
        result,
        console_output: console.output(),
        locals,
    }
}
