//! End-to-end pipeline tests against the in-memory store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use serde_json::json;
use snare_server::auth::{generate_signature, HmacAlgorithm};
use snare_server::model::{
    Exchange, ExchangeStatus, ExecutionStatus, HandlerDefinition, JwksConfig,
    TcpHandlerDefinition,
};
use snare_server::pipeline::Pipeline;
use snare_server::store::{CaptureStore, ExchangeFilter, MemoryStore};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn pipeline() -> Pipeline {
    Pipeline::new(Arc::new(MemoryStore::new()))
}

fn handler(method: &str, path: &str, order: i64, code: &str) -> HandlerDefinition {
    HandlerDefinition {
        id: Uuid::new_v4(),
        version: 0,
        name: format!("{method} {path}"),
        code: code.to_string(),
        method: method.to_string(),
        path: path.to_string(),
        order,
        jwks: None,
    }
}

fn request(method: &str, path: &str, headers: Vec<(String, String)>, body: Option<Vec<u8>>) -> Exchange {
    Exchange::new_http(
        method.to_string(),
        format!("http://localhost{path}"),
        path.to_string(),
        Some("127.0.0.1:50000".to_string()),
        headers,
        HashMap::new(),
        body,
    )
}

#[test]
fn webhook_hmac_verification_end_to_end() {
    let pipeline = pipeline();
    pipeline
        .store()
        .create_handler(handler(
            "POST",
            "/webhooks/github",
            0,
            r#"
                let sig = req.headers["x-hub-signature-256"];
                let check = hmac.verify(sig, "webhook-secret");
                if check.isValid {
                    resp.status = 202;
                    resp.body = #{ accepted: true, algorithm: check.algorithm };
                } else {
                    resp.status = 401;
                    resp.body = #{ accepted: false, error: check.error };
                }
            "#,
        ))
        .unwrap();

    let payload = br#"{"action":"opened"}"#.to_vec();
    let signature = generate_signature(&payload, "webhook-secret", HmacAlgorithm::Sha256);

    // Correctly signed delivery
    let good = request(
        "POST",
        "/webhooks/github",
        vec![(
            "X-Hub-Signature-256".to_string(),
            format!("sha256={signature}"),
        )],
        Some(payload.clone()),
    );
    let snapshot = pipeline.run_http_exchange(good).unwrap();
    assert_eq!(snapshot.status, 202);
    let body: serde_json::Value = serde_json::from_slice(&snapshot.body.unwrap()).unwrap();
    assert_eq!(body["accepted"], json!(true));
    assert_eq!(body["algorithm"], json!("SHA256"));

    // Tampered payload
    let bad = request(
        "POST",
        "/webhooks/github",
        vec![(
            "X-Hub-Signature-256".to_string(),
            format!("sha256={signature}"),
        )],
        Some(br#"{"action":"closed"}"#.to_vec()),
    );
    let snapshot = pipeline.run_http_exchange(bad).unwrap();
    assert_eq!(snapshot.status, 401);
}

#[test]
fn jwt_gated_handler_end_to_end() {
    let secret = b"integration-test-secret-material";
    let jwks = json!({
        "keys": [{"kty": "oct", "kid": "primary", "alg": "HS256",
                  "k": URL_SAFE_NO_PAD.encode(secret)}]
    });

    let pipeline = pipeline();
    let mut gated = handler(
        "GET",
        "/secure",
        0,
        r#"
            jwt.requireJWTVerification();
            resp.status = 200;
            resp.body = #{ keyId: jwt.getJWTKeyId() };
        "#,
    );
    gated.jwks = Some(JwksConfig::Inline {
        json: jwks.to_string(),
    });
    pipeline.store().create_handler(gated).unwrap();

    let exp = Utc::now().timestamp() + 600;
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &json!({"sub": "ci", "exp": exp}),
        &jsonwebtoken::EncodingKey::from_secret(secret),
    )
    .unwrap();

    let authorized = request(
        "GET",
        "/secure",
        vec![("Authorization".to_string(), format!("Bearer {token}"))],
        None,
    );
    let snapshot = pipeline.run_http_exchange(authorized).unwrap();
    assert_eq!(snapshot.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&snapshot.body.unwrap()).unwrap();
    assert_eq!(body["keyId"], json!("primary"));

    // No credentials: the require call throws and the pipeline synthesizes
    // the error response
    let anonymous = request("GET", "/secure", Vec::new(), None);
    let id = anonymous.id;
    let snapshot = pipeline.run_http_exchange(anonymous).unwrap();
    assert_eq!(snapshot.status, 500);
    let body: serde_json::Value = serde_json::from_slice(&snapshot.body.unwrap()).unwrap();
    assert_eq!(body["error"], json!("Error: Invalid JWT structure"));

    let stored = pipeline.store().get_exchange(id).unwrap();
    assert_eq!(stored.status, ExchangeStatus::Error);
    let records = pipeline.store().list_executions(id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Error);
}

#[test]
fn handler_updates_apply_to_the_next_request() {
    let pipeline = pipeline();
    let mut definition = handler("GET", "/version", 0, "resp.body = \"v1\";");
    let id = definition.id;
    pipeline.store().create_handler(definition.clone()).unwrap();

    let snapshot = pipeline
        .run_http_exchange(request("GET", "/version", Vec::new(), None))
        .unwrap();
    assert_eq!(snapshot.body.as_deref(), Some(b"v1".as_slice()));

    definition.code = "resp.body = \"v2\";".to_string();
    pipeline.store().update_handler(definition).unwrap();
    assert_eq!(pipeline.store().get_handler(id).unwrap().version, 1);

    let snapshot = pipeline
        .run_http_exchange(request("GET", "/version", Vec::new(), None))
        .unwrap();
    assert_eq!(snapshot.body.as_deref(), Some(b"v2".as_slice()));
}

#[test]
fn captured_exchanges_are_listable_and_archivable() {
    let pipeline = pipeline();
    let first = request("GET", "/a", Vec::new(), None);
    let second = request("GET", "/b", Vec::new(), None);
    let first_id = first.id;
    pipeline.run_http_exchange(first).unwrap();
    pipeline.run_http_exchange(second).unwrap();

    let all = pipeline
        .store()
        .list_exchanges(ExchangeFilter::default())
        .unwrap();
    assert_eq!(all.len(), 2);

    pipeline.store().archive_exchanges(&[first_id]).unwrap();
    let active = pipeline
        .store()
        .list_exchanges(ExchangeFilter {
            archived: Some(false),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_ne!(active[0].id, first_id);

    let shared_id = pipeline.store().share_exchange(first_id).unwrap();
    let shared = pipeline.store().get_shared_exchange(&shared_id).unwrap();
    assert_eq!(shared.id, first_id);
}

#[test]
fn tcp_session_lifecycle() {
    let pipeline = pipeline();
    pipeline
        .store()
        .set_tcp_handler(TcpHandlerDefinition {
            id: Uuid::new_v4(),
            version: 0,
            name: "echo".to_string(),
            code: "resp.write(req.bytes);".to_string(),
            enabled: true,
        })
        .unwrap();

    let exchange = Exchange::new_tcp("192.168.1.2:41000".to_string());
    let id = exchange.id;
    pipeline.store().create_exchange(exchange.clone()).unwrap();

    pipeline
        .store()
        .append_exchange_data(id, b"first ")
        .unwrap();
    let outcome = pipeline
        .run_tcp_chunk(&exchange, b"first ".to_vec(), rhai::Map::new(), 0)
        .unwrap();
    assert_eq!(outcome.writes, vec![b"first ".to_vec()]);

    pipeline.store().append_exchange_data(id, b"second").unwrap();
    pipeline
        .run_tcp_chunk(&exchange, b"second".to_vec(), outcome.locals, 1)
        .unwrap();

    pipeline.finalize_tcp_exchange(id).unwrap();

    let stored = pipeline.store().get_exchange(id).unwrap();
    assert_eq!(stored.status, ExchangeStatus::Complete);
    assert_eq!(stored.body, Some(b"first second".to_vec()));
    assert_eq!(pipeline.store().list_executions(id).unwrap().len(), 2);
}

#[test]
fn later_handler_wins_shared_fields_across_prefix_patterns() {
    let pipeline = pipeline();
    pipeline
        .store()
        .create_handler(handler(
            "*",
            "/foo",
            1,
            r#"resp.status = 201; resp.set_header("X-Who", "first");"#,
        ))
        .unwrap();
    pipeline
        .store()
        .create_handler(handler(
            "GET",
            "/foo/bar",
            2,
            r#"resp.status = 202;"#,
        ))
        .unwrap();

    let exchange = request("GET", "/foo/bar", Vec::new(), None);
    let id = exchange.id;
    let snapshot = pipeline.run_http_exchange(exchange).unwrap();

    // Both matched; the later handler's status write won, the first
    // handler's untouched header stayed
    assert_eq!(snapshot.status, 202);
    assert_eq!(
        snapshot.headers,
        vec![("X-Who".to_string(), "first".to_string())]
    );

    let records = pipeline.store().list_executions(id).unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn earlier_success_records_survive_a_later_failure() {
    let pipeline = pipeline();
    pipeline
        .store()
        .create_handler(handler("GET", "/mixed", 0, r#"locals.ok = true;"#))
        .unwrap();
    pipeline
        .store()
        .create_handler(handler("GET", "/mixed", 1, r#"throw "boom";"#))
        .unwrap();

    let exchange = request("GET", "/mixed", Vec::new(), None);
    let id = exchange.id;
    let snapshot = pipeline.run_http_exchange(exchange).unwrap();

    assert_eq!(snapshot.status, 500);
    let body: serde_json::Value = serde_json::from_slice(&snapshot.body.unwrap()).unwrap();
    assert_eq!(body["error"], json!("Error: boom"));

    let records = pipeline.store().list_executions(id).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, ExecutionStatus::Success);
    assert_eq!(records[1].status, ExecutionStatus::Error);
    assert_eq!(records[1].error_message.as_deref(), Some("Error: boom"));
}

#[test]
fn wildcard_method_handler_sees_every_verb() {
    let pipeline = pipeline();
    pipeline
        .store()
        .create_handler(handler(
            "*",
            "/anything",
            0,
            r#"resp.set_header("X-Method", req.method);"#,
        ))
        .unwrap();

    for method in ["GET", "POST", "DELETE"] {
        let snapshot = pipeline
            .run_http_exchange(request(method, "/anything/nested", Vec::new(), None))
            .unwrap();
        assert_eq!(
            snapshot.headers,
            vec![("X-Method".to_string(), method.to_string())]
        );
    }
}
