use proptest::prelude::*;
use usersync_types::{PropertyValue, Timestamp};

#[test]
fn null_is_default() {
    assert_eq!(PropertyValue::default(), PropertyValue::Null);
    assert!(PropertyValue::Null.is_null());
}

#[test]
fn conversions() {
    assert_eq!(PropertyValue::from("pro"), PropertyValue::String("pro".into()));
    assert_eq!(PropertyValue::from(true), PropertyValue::Bool(true));
    assert_eq!(PropertyValue::from(3i64), PropertyValue::Number(3.0));
    assert_eq!(PropertyValue::from(None::<&str>), PropertyValue::Null);
    assert_eq!(PropertyValue::from(Some("x")), PropertyValue::String("x".into()));
}

#[test]
fn accessors() {
    assert_eq!(PropertyValue::from("a").as_str(), Some("a"));
    assert_eq!(PropertyValue::from(false).as_bool(), Some(false));
    assert_eq!(PropertyValue::from(1.5).as_f64(), Some(1.5));
    assert_eq!(PropertyValue::Null.as_str(), None);
}

#[test]
fn json_shape_is_plain_scalar() {
    assert_eq!(serde_json::to_string(&PropertyValue::Null).unwrap(), "null");
    assert_eq!(serde_json::to_string(&PropertyValue::from("a")).unwrap(), r#""a""#);
    assert_eq!(serde_json::to_string(&PropertyValue::from(true)).unwrap(), "true");

    let n: PropertyValue = serde_json::from_str("7").unwrap();
    assert_eq!(n, PropertyValue::Number(7.0));
}

#[test]
fn non_finite_number_maps_to_json_null() {
    assert_eq!(PropertyValue::Number(f64::NAN).to_json(), serde_json::Value::Null);
}

#[test]
fn non_finite_numbers_convert_to_null() {
    assert_eq!(PropertyValue::from(f64::NAN), PropertyValue::Null);
    assert_eq!(PropertyValue::from(f64::INFINITY), PropertyValue::Null);
    assert_eq!(PropertyValue::Number(f64::NEG_INFINITY).normalized(), PropertyValue::Null);
    assert_eq!(PropertyValue::Number(2.5).normalized(), PropertyValue::Number(2.5));
}

#[test]
fn numbers_needing_exact_parsing_survive_json() {
    let value = PropertyValue::Number(-912517127.1634152);
    let json = serde_json::to_string(&value).unwrap();
    let back: PropertyValue = serde_json::from_str(&json).unwrap();
    assert_eq!(back, value);
}

#[test]
fn timestamp_now_is_after_epoch() {
    let ts = Timestamp::now();
    assert!(ts.as_millis() > 1_600_000_000_000);
    assert_eq!(Timestamp::from_millis(5).as_millis(), 5);
}

fn value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        Just(PropertyValue::Null),
        any::<bool>().prop_map(PropertyValue::Bool),
        any::<f64>()
            .prop_filter("finite", |n| n.is_finite())
            .prop_map(PropertyValue::Number),
        "[a-z0-9 ]{0,16}".prop_map(PropertyValue::String),
    ]
}

proptest! {
    #[test]
    fn json_preserves_value(value in value_strategy()) {
        let json = serde_json::to_string(&value).unwrap();
        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, value);
    }
}
