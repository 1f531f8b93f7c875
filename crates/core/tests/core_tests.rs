//! Integration tests for the core crate.

use agent_core::{
    bind_at, ActionArgs, ApplySpec, BindError, DrainParams, DrainType, PackageSpec, Reply,
    StateEnvelope, TaskState, TaskStateEnvelope, Variadic,
};
use serde_json::json;

#[test]
fn test_reply_envelope_serde() {
    let ok = Reply::Value(json!("pong"));
    assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"value": "pong"}));

    let err = Reply::exception("Task with id 7 could not be found");
    assert_eq!(
        serde_json::to_value(&err).unwrap(),
        json!({"exception": {"message": "Task with id 7 could not be found"}})
    );

    let back: Reply = serde_json::from_value(json!({"value": null})).unwrap();
    assert_eq!(back, Reply::Value(serde_json::Value::Null));
}

#[test]
fn test_task_state_envelope_serde() {
    let env = TaskStateEnvelope {
        agent_task_id: "abc".into(),
        state: TaskState::Running,
    };
    assert_eq!(
        serde_json::to_value(&env).unwrap(),
        json!({"agent_task_id": "abc", "state": "running"})
    );
    assert!(!TaskState::Running.is_terminal());
    assert!(TaskState::Cancelled.is_terminal());
}

#[test]
fn test_apply_spec_keeps_unknown_fields() {
    let raw = json!({
        "deployment": "dep",
        "job": {"name": "web", "template": "nginx"},
        "packages": {"ruby": {"name": "ruby", "version": "1", "sha1": "s", "blobstore_id": "b"}},
        "configuration_hash": "abc",
        "properties": {"port": 80}
    });
    let spec: ApplySpec = serde_json::from_value(raw).unwrap();
    assert_eq!(spec.job_template(), Some("nginx"));
    assert_eq!(spec.config_hash(), Some("abc"));
    assert_eq!(spec.packages["ruby"].blobstore_id, "b");
    assert_eq!(spec.extra["properties"], json!({"port": 80}));

    let written = serde_json::to_value(&spec).unwrap();
    assert_eq!(written["properties"], json!({"port": 80}));
}

#[test]
fn test_empty_template_is_no_job() {
    let spec: ApplySpec = serde_json::from_value(json!({"job": {"template": ""}})).unwrap();
    assert_eq!(spec.job_template(), None);
}

#[test]
fn test_state_envelope_flattens_spec() {
    let env = StateEnvelope {
        spec: ApplySpec {
            deployment: Some("dep".into()),
            ..Default::default()
        },
        agent_id: "agent-1".into(),
        bosh_protocol: "1".into(),
        job_state: "running".into(),
        vm: Default::default(),
        ntp: Default::default(),
        vitals: None,
    };
    let v = serde_json::to_value(&env).unwrap();
    assert_eq!(v["deployment"], "dep");
    assert_eq!(v["agent_id"], "agent-1");
    assert!(v.get("vitals").is_none());
}

#[test]
fn test_drain_type_wire_names() {
    let t: DrainType = serde_json::from_value(json!("shutdown")).unwrap();
    assert_eq!(t, DrainType::Shutdown);
    assert!(serde_json::from_value::<DrainType>(json!("restart")).is_err());
}

#[test]
fn test_drain_update_lists_new_and_changed_packages() {
    let pkg = |sha1: &str| PackageSpec {
        sha1: sha1.into(),
        ..Default::default()
    };
    let mut current = ApplySpec::default();
    current.packages.insert("a".into(), pkg("1"));
    current.packages.insert("b".into(), pkg("1"));
    let mut new = current.clone();
    new.packages.insert("b".into(), pkg("2"));
    new.packages.insert("c".into(), pkg("1"));

    let params = DrainParams::for_update(&current, &new);
    assert_eq!(params.updated_packages, vec!["b", "c"]);
    assert_eq!(
        params.script_args(),
        vec!["job_new", "hash_unchanged", "b", "c"]
    );
}

#[test]
fn test_struct_argument_binds_from_object() {
    let spec: ApplySpec = bind_at(&[json!({"configuration_hash": "h"})], 0).unwrap();
    assert_eq!(spec.config_hash(), Some("h"));

    let err = bind_at::<ApplySpec>(&[json!("not a spec")], 0).unwrap_err();
    assert!(matches!(err, BindError::ArgumentTypeMismatch { position: 0, .. }));
}

#[test]
fn test_variadic_collects_trailing_arguments() {
    let rest = Variadic::<String>::bind(&[json!("full"), json!("extra")]).unwrap();
    assert_eq!(rest.first().map(String::as_str), Some("full"));
    assert_eq!(rest.len(), 2);
    assert_eq!(<Variadic<String> as ActionArgs>::REQUIRED, 0);
}
