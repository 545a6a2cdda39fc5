use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Value,
    row::{DecodeError, FromValue, mismatch},
};

/// Json document stored in a `String` column.
///
/// # Panics
///
/// Note that when converting into [`Value`], if [`Serialize`] implementation
/// decide to fail, it will panics.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> FromValue for Json<T> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => Ok(Self(serde_json::from_str(&s)?)),
            Value::Bytes(b) => Ok(Self(serde_json::from_slice(&b)?)),
            value => mismatch("Json", &value),
        }
    }
}

impl<T: Serialize> From<Json<T>> for Value {
    fn from(value: Json<T>) -> Self {
        match serde_json::to_string(&value.0) {
            Ok(json) => Value::String(json),
            Err(err) => panic!("failed to serialize json: {err}"),
        }
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Event {
        kind: String,
        count: u32,
    }

    #[test]
    fn json_column() {
        let value = Value::from(Json(Event { kind: "click".into(), count: 2 }));
        assert_eq!(value, Value::from(r#"{"kind":"click","count":2}"#));

        let Json(event) = Json::<Event>::from_value(value).unwrap();
        assert_eq!(event, Event { kind: "click".into(), count: 2 });

        let err = Json::<Event>::from_value(Value::from("{")).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        let err = Json::<Event>::from_value(Value::UInt8(1)).unwrap_err();
        assert!(matches!(err, DecodeError::Mismatch { expected: "Json", .. }));
    }
}
