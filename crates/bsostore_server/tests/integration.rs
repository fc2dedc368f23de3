//! End-to-end request flow tests.

use bsostore_core::{AccountId, ManualClock, Timestamp};
use bsostore_server::{
    AllowAll, RequestContext, ServerConfig, StorageRequest, StorageResponse, StorageServer,
    TokenResolver, LAST_MODIFIED_HEADER, RECORDS_HEADER, TIMESTAMP_HEADER,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::tempdir;

struct Harness {
    clock: Arc<ManualClock>,
    server: StorageServer,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    fn with_config(config: ServerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
        let server = StorageServer::with_clock(config, Arc::new(AllowAll), clock.clone());
        Self { clock, server }
    }

    fn ctx(&self) -> RequestContext {
        RequestContext::new("alice", "")
    }

    fn send(&self, request: StorageRequest) -> StorageResponse {
        self.server.handle(&self.ctx(), request)
    }

    fn put(&self, collection: &str, id: &str, body: Value) -> StorageResponse {
        self.send(StorageRequest::PutItem {
            collection: collection.into(),
            id: id.into(),
            body: body.to_string().into_bytes(),
        })
    }

    fn get(&self, collection: &str, id: &str) -> StorageResponse {
        self.send(StorageRequest::GetItem {
            collection: collection.into(),
            id: id.into(),
        })
    }

    fn list(&self, collection: &str, params: &[(&str, &str)]) -> StorageResponse {
        self.send(StorageRequest::GetCollection {
            collection: collection.into(),
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        })
    }
}

fn timestamp_header(response: &StorageResponse) -> Timestamp {
    Timestamp::parse(response.header(TIMESTAMP_HEADER).unwrap()).unwrap()
}

#[test]
fn put_then_get_returns_every_field() {
    let h = Harness::new();
    let put = h.put(
        "bookmarks",
        "b1",
        json!({"sortindex": 2, "payload": "{\"title\":\"x\"}", "parentid": "menu", "ttl": 600}),
    );
    assert_eq!(put.status, 200);
    let modified = timestamp_header(&put);

    let got = h.get("bookmarks", "b1");
    assert_eq!(got.status, 200);
    let body = got.json_body().unwrap();
    assert_eq!(body["id"], "b1");
    assert_eq!(body["sortindex"], 2);
    assert_eq!(body["payload"], "{\"title\":\"x\"}");
    assert_eq!(body["parentid"], "menu");
    assert_eq!(body["ttl"], 600);
    assert_eq!(body["modified"].as_f64().unwrap(), modified.as_secs_f64());
    assert!(body.get("payload_size").is_none());
}

#[test]
fn list_sorted_by_index_with_record_count() {
    let h = Harness::new();
    for (id, index) in [("a", 5), ("b", 1), ("c", 9), ("d", 3)] {
        h.put("history", id, json!({"sortindex": index}));
    }

    let response = h.list("history", &[("sort", "index")]);
    assert_eq!(response.header(RECORDS_HEADER), Some("4"));
    assert_eq!(response.json_body().unwrap(), json!(["c", "a", "d", "b"]));

    let response = h.list("history", &[("sort", "index"), ("full", "1"), ("limit", "2")]);
    let indexes: Vec<i64> = response
        .json_body()
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|bso| bso["sortindex"].as_i64().unwrap())
        .collect();
    assert_eq!(indexes, vec![9, 5]);
}

#[test]
fn list_missing_collection_is_empty() {
    let h = Harness::new();
    let response = h.list("nothing", &[]);
    assert_eq!(response.status, 200);
    assert_eq!(response.header(RECORDS_HEADER), Some("0"));
    assert_eq!(response.json_body().unwrap(), json!([]));
}

#[test]
fn bad_list_parameters_are_rejected() {
    let h = Harness::new();
    for params in [[("limit", "many")], [("sort", "sideways")], [("newer", "x")]] {
        let response = h.list("history", &params);
        assert_eq!(response.status, 400, "{params:?}");
    }
}

#[test]
fn newlines_output_keeps_one_record_per_line() {
    let h = Harness::new();
    h.put("forms", "f1", json!({"payload": "a\nb"}));
    h.put("forms", "f2", json!({"payload": "c"}));

    let response = h.server.handle(
        &h.ctx().with_accept("application/newlines"),
        StorageRequest::GetCollection {
            collection: "forms".into(),
            params: vec![("full".into(), "1".into())],
        },
    );
    assert_eq!(response.header("content-type"), Some("application/newlines"));
    let text = String::from_utf8(response.body.clone()).unwrap();
    let lines: Vec<&str> = text.split('\n').collect();
    assert_eq!(lines.len(), 2);
    let first: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["payload"], "a\nb");
}

#[test]
fn batch_reports_each_record() {
    let h = Harness::new();
    let body = json!([
        {"id": "a", "payload": "1"},
        {"id": "b", "sortindex": "high"},
        {"id": "c", "payload": "3"}
    ]);
    let response = h.send(StorageRequest::PostCollection {
        collection: "tabs".into(),
        body: body.to_string().into_bytes(),
    });
    assert_eq!(response.status, 200);

    let report = response.json_body().unwrap();
    assert_eq!(report["success"], json!(["a", "c"]));
    assert!(report["failed"]["b"].is_array());
    assert_eq!(
        report["modified"].as_f64().unwrap(),
        timestamp_header(&response).as_secs_f64()
    );

    assert_eq!(h.get("tabs", "a").status, 200);
    assert_eq!(h.get("tabs", "b").status, 404);
}

#[test]
fn batch_accepts_newlines_body() {
    let h = Harness::new();
    let response = h.server.handle(
        &h.ctx().with_content_type("application/newlines"),
        StorageRequest::PostCollection {
            collection: "tabs".into(),
            body: b"{\"id\":\"x\"}\n{\"id\":\"y\"}\n".to_vec(),
        },
    );
    assert_eq!(response.json_body().unwrap()["success"], json!(["x", "y"]));
}

#[test]
fn malformed_batch_body_is_rejected() {
    let h = Harness::new();
    let response = h.send(StorageRequest::PostCollection {
        collection: "tabs".into(),
        body: b"{\"id\": \"not a list\"}".to_vec(),
    });
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body().unwrap()["error"], "malformed-request");
}

#[test]
fn partial_update_keeps_other_fields() {
    let h = Harness::new();
    h.put("prefs", "p", json!({"payload": "old", "sortindex": 7}));
    h.clock.advance_secs(1);
    h.put("prefs", "p", json!({"payload": "new"}));

    let body = h.get("prefs", "p").json_body().unwrap();
    assert_eq!(body["payload"], "new");
    assert_eq!(body["sortindex"], 7);
}

#[test]
fn invalid_record_on_put() {
    let h = Harness::new();
    let response = h.put("prefs", "p", json!({"sortindex": "abc"}));
    assert_eq!(response.status, 400);
    assert_eq!(response.json_body().unwrap()["error"], "invalid-record");
}

#[test]
fn precondition_guards_writes() {
    let h = Harness::new();
    let first = timestamp_header(&h.put("tabs", "a", json!({"payload": "1"})));
    h.clock.advance_secs(5);

    let stale = first.to_string();
    let ok = h.server.handle(
        &h.ctx().with_if_unmodified_since(stale.clone()),
        StorageRequest::PutItem {
            collection: "tabs".into(),
            id: "a".into(),
            body: br#"{"payload":"2"}"#.to_vec(),
        },
    );
    assert_eq!(ok.status, 200);
    let second = timestamp_header(&ok);

    let rejected = h.server.handle(
        &h.ctx().with_if_unmodified_since(stale),
        StorageRequest::DeleteItem {
            collection: "tabs".into(),
            id: "a".into(),
        },
    );
    assert_eq!(rejected.status, 412);
    assert_eq!(
        rejected.header(LAST_MODIFIED_HEADER),
        Some(second.to_string().as_str())
    );
    assert_eq!(h.get("tabs", "a").json_body().unwrap()["payload"], "2");

    let bad_header = h.server.handle(
        &h.ctx().with_if_unmodified_since("not-a-time"),
        StorageRequest::DeleteItem {
            collection: "tabs".into(),
            id: "a".into(),
        },
    );
    assert_eq!(bad_header.status, 400);
}

#[test]
fn precondition_on_missing_collection_passes() {
    let h = Harness::new();
    let response = h.server.handle(
        &h.ctx().with_if_unmodified_since("1.00"),
        StorageRequest::PutItem {
            collection: "fresh".into(),
            id: "a".into(),
            body: b"{}".to_vec(),
        },
    );
    assert_eq!(response.status, 200);
}

#[test]
fn ttl_records_expire() {
    let h = Harness::new();
    h.put("tabs", "short", json!({"ttl": 1}));
    h.put("tabs", "long", json!({}));
    h.clock.advance_secs(2);

    assert_eq!(h.get("tabs", "short").status, 404);
    assert_eq!(h.list("tabs", &[]).json_body().unwrap(), json!(["long"]));
}

#[test]
fn delete_by_filter_and_collection_disappears() {
    let h = Harness::new();
    for (id, index) in [("a", 1), ("b", 2), ("c", 3)] {
        h.put("history", id, json!({"sortindex": index}));
    }

    let response = h.send(StorageRequest::DeleteCollection {
        collection: "history".into(),
        params: vec![("index_above".into(), "1".into())],
    });
    assert_eq!(response.status, 200);
    assert_eq!(h.list("history", &[]).json_body().unwrap(), json!(["a"]));

    h.send(StorageRequest::DeleteItem {
        collection: "history".into(),
        id: "a".into(),
    });
    let info = h.send(StorageRequest::InfoCollections).json_body().unwrap();
    assert_eq!(info, json!({}));

    let missing = h.send(StorageRequest::DeleteItem {
        collection: "history".into(),
        id: "a".into(),
    });
    assert_eq!(missing.status, 404);
}

#[test]
fn info_endpoints() {
    let h = Harness::new();
    let empty = h.send(StorageRequest::InfoQuota);
    assert_eq!(empty.json_body().unwrap(), json!([0.0, null]));

    h.put("tabs", "t", json!({"payload": "x".repeat(2048)}));
    h.clock.advance_secs(1);
    h.put("forms", "f", json!({"payload": "y".repeat(1024)}));
    h.put("forms", "g", json!({}));

    let counts = h.send(StorageRequest::InfoCollectionCounts).json_body().unwrap();
    assert_eq!(counts, json!({"forms": 2, "tabs": 1}));

    let usage = h.send(StorageRequest::InfoCollectionUsage).json_body().unwrap();
    assert_eq!(usage, json!({"forms": 1.0, "tabs": 2.0}));

    let quota = h.send(StorageRequest::InfoQuota).json_body().unwrap();
    assert_eq!(quota, json!([3.0, null]));

    let info = h.send(StorageRequest::InfoCollections).json_body().unwrap();
    assert!(info["tabs"].as_f64().unwrap() < info["forms"].as_f64().unwrap());
}

#[test]
fn delete_storage_wipes_everything() {
    let h = Harness::new();
    h.put("tabs", "t", json!({"payload": "x"}));
    h.put("forms", "f", json!({"payload": "y"}));

    let response = h.send(StorageRequest::DeleteStorage { confirm: true });
    assert_eq!(response.status, 200);
    assert_eq!(h.send(StorageRequest::InfoCollections).json_body().unwrap(), json!({}));
    assert_eq!(h.get("tabs", "t").status, 404);
}

#[test]
fn accounts_do_not_see_each_other() {
    let h = Harness::new();
    h.put("tabs", "mine", json!({"payload": "alice"}));

    let bob = RequestContext::new("bob", "");
    let response = h.server.handle(
        &bob,
        StorageRequest::GetItem {
            collection: "tabs".into(),
            id: "mine".into(),
        },
    );
    assert_eq!(response.status, 404);
}

#[test]
fn token_authentication_flow() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(10_000)));
    let tokens = Arc::new(TokenResolver::new(
        b"integration-secret".to_vec(),
        clock.clone(),
    ));
    let server = StorageServer::with_clock(ServerConfig::default(), tokens.clone(), clock);

    let token = tokens.issue(&AccountId::parse("alice").unwrap()).unwrap();
    let ok = server.handle(
        &RequestContext::new("alice", token.clone()),
        StorageRequest::InfoCollections,
    );
    assert_eq!(ok.status, 200);

    let stolen = server.handle(&RequestContext::new("bob", token), StorageRequest::InfoCollections);
    assert_eq!(stolen.status, 401);
    assert_eq!(server.open_accounts(), 1);
}

#[test]
fn data_survives_server_restart() {
    let dir = tempdir().unwrap();
    let config = ServerConfig::default().with_data_dir(dir.path());

    {
        let h = Harness::with_config(config.clone());
        h.put("bookmarks", "b", json!({"payload": "kept", "sortindex": 4}));
        h.put("bookmarks", "gone", json!({}));
        h.send(StorageRequest::DeleteItem {
            collection: "bookmarks".into(),
            id: "gone".into(),
        });
    }

    let h = Harness::with_config(config);
    let body = h.get("bookmarks", "b").json_body().unwrap();
    assert_eq!(body["payload"], "kept");
    assert_eq!(body["sortindex"], 4);
    assert_eq!(h.get("bookmarks", "gone").status, 404);
}

#[test]
fn concurrent_writers_get_distinct_timestamps() {
    let h = Harness::new();
    let stamps: Vec<Timestamp> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let h = &h;
                scope.spawn(move || {
                    (0..10)
                        .map(|i| timestamp_header(&h.put("tabs", &format!("w{worker}-{i}"), json!({}))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let unique: BTreeSet<_> = stamps.iter().copied().collect();
    assert_eq!(unique.len(), 80);
    let counts = h.send(StorageRequest::InfoCollectionCounts).json_body().unwrap();
    assert_eq!(counts["tabs"], 80);
}

#[test]
fn rejected_requests_leave_no_account_on_disk() {
    let dir = tempdir().unwrap();
    let h = Harness::with_config(ServerConfig::default().with_data_dir(dir.path()));
    let mallory = RequestContext::new("mallory", "");

    let bad_limit = h.server.handle(
        &mallory,
        StorageRequest::GetCollection {
            collection: "tabs".into(),
            params: vec![("limit".into(), "ten".into())],
        },
    );
    assert_eq!(bad_limit.status, 400);

    let bad_precondition = h.server.handle(
        &mallory.clone().with_if_unmodified_since("soon"),
        StorageRequest::DeleteItem {
            collection: "tabs".into(),
            id: "a".into(),
        },
    );
    assert_eq!(bad_precondition.status, 400);

    let bad_body = h.server.handle(
        &mallory,
        StorageRequest::PutItem {
            collection: "tabs".into(),
            id: "a".into(),
            body: b"{not json".to_vec(),
        },
    );
    assert_eq!(bad_body.status, 400);

    let unconfirmed = h.server.handle(&mallory, StorageRequest::DeleteStorage { confirm: false });
    assert_eq!(unconfirmed.status, 400);

    assert!(!dir.path().join("mallory").exists());
    assert_eq!(h.server.open_accounts(), 0);
}

#[test]
fn precondition_follows_newest_remaining_record() {
    let h = Harness::new();
    let x = timestamp_header(&h.put("tabs", "x", json!({})));
    h.clock.advance_secs(1);
    h.put("tabs", "y", json!({}));
    h.clock.advance_secs(1);
    h.send(StorageRequest::DeleteItem {
        collection: "tabs".into(),
        id: "y".into(),
    });

    let info = h.send(StorageRequest::InfoCollections).json_body().unwrap();
    assert_eq!(info["tabs"], json!(x.as_secs_f64()));

    let response = h.server.handle(
        &h.ctx().with_if_unmodified_since(x.to_string()),
        StorageRequest::PutItem {
            collection: "tabs".into(),
            id: "z".into(),
            body: b"{}".to_vec(),
        },
    );
    assert_eq!(response.status, 200);
}

#[test]
fn expired_records_drop_out_of_info_endpoints() {
    let h = Harness::new();
    h.put("c", "short", json!({"payload": "abc", "ttl": 1}));
    h.clock.advance_secs(5);

    let counts = h.send(StorageRequest::InfoCollectionCounts).json_body().unwrap();
    assert_eq!(counts, json!({}));
    let quota = h.send(StorageRequest::InfoQuota).json_body().unwrap();
    assert_eq!(quota, json!([0.0, null]));
}

#[test]
fn idle_accounts_are_closed_past_the_bound() {
    let dir = tempdir().unwrap();
    let h = Harness::with_config(
        ServerConfig::default()
            .with_data_dir(dir.path())
            .with_max_open_accounts(2),
    );
    for name in ["a1", "a2", "a3", "a4"] {
        let response = h.server.handle(&RequestContext::new(name, ""), StorageRequest::InfoQuota);
        assert_eq!(response.status, 200);
    }
    assert_eq!(h.server.open_accounts(), 2);
}
