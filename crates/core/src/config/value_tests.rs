// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    int = { ValueKind::Int, "42" },
    long = { ValueKind::Long, "9000000000" },
    bool_true = { ValueKind::Bool, "true" },
    string = { ValueKind::Str, "hello" },
    list = { ValueKind::List, "a,b,c" },
)]
fn parse_then_render_round_trips(kind: ValueKind, raw: &str) {
    let value = ConfigValue::parse(kind, "k", raw).unwrap();
    assert_eq!(value.kind(), kind);
    assert_eq!(value.render(), raw);
}

#[test]
fn int_rejects_overflow() {
    let err = ConfigValue::parse(ValueKind::Int, "k", "9000000000").unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { .. }));
}

#[test]
fn bool_rejects_yes() {
    assert!(ConfigValue::parse(ValueKind::Bool, "k", "yes").is_err());
}

#[test]
fn list_trims_and_drops_empties() {
    let value = ConfigValue::parse(ValueKind::List, "k", " a , ,b, ").unwrap();
    assert_eq!(value, ConfigValue::List(vec!["a".into(), "b".into()]));
}

#[test]
fn empty_list_renders_empty() {
    let value = ConfigValue::parse(ValueKind::List, "k", "").unwrap();
    assert_eq!(value, ConfigValue::List(vec![]));
    assert_eq!(value.render(), "");
}

#[test]
fn json_round_trip_per_kind() {
    let cases = [
        ConfigValue::Int(7),
        ConfigValue::Long(1 << 40),
        ConfigValue::Bool(false),
        ConfigValue::Str("x".into()),
        ConfigValue::List(vec!["a".into()]),
    ];
    for value in cases {
        let back = ConfigValue::from_json(value.kind(), "k", &value.to_json()).unwrap();
        assert_eq!(back, value);
    }
}

#[test]
fn from_json_type_mismatch() {
    let err = ConfigValue::from_json(ValueKind::Bool, "k", &serde_json::json!(3)).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { .. }));
}

#[test]
fn typed_bridge_round_trips() {
    assert_eq!(i32::from_value(&42i32.into_value()), Some(42));
    assert_eq!(i64::from_value(&7i64.into_value()), Some(7));
    assert_eq!(bool::from_value(&true.into_value()), Some(true));
    assert_eq!(String::from_value(&String::from("s").into_value()), Some("s".into()));
    assert_eq!(
        Vec::<String>::from_value(&vec![String::from("a")].into_value()),
        Some(vec!["a".to_string()])
    );
}

#[test]
fn typed_bridge_rejects_wrong_kind() {
    assert_eq!(i32::from_value(&ConfigValue::Long(1)), None);
    assert_eq!(bool::from_value(&ConfigValue::Str("true".into())), None);
}
