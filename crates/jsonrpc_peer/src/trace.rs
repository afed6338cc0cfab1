use std::collections::HashMap;

use serde_json::{Map, Value};

/// Key under which the serialized trace context rides in request params.
pub const CARRIER_KEY: &str = "carrier";

/// Supplies the serialized trace context attached to outbound requests.
///
/// The endpoint fixes where the carrier lands in `params`; the backend that
/// produces it (an OpenTelemetry propagator, a test stub) is supplied by
/// the application through [`EndpointConfig`](crate::EndpointConfig).
pub trait TraceContextInjector: Send + Sync {
    fn carrier(&self) -> HashMap<String, String>;
}

/// Places the carrier into `params` without disturbing the payload shape:
/// object params gain a `"carrier"` member, a one-element array holding an
/// object gains it on that element, any other array gets it appended.
/// Scalar params are left alone. Peers that read trace context out of
/// params rely on this exact placement.
pub(crate) fn inject_carrier(params: &mut Value, carrier: HashMap<String, String>) {
    let carrier = Value::Object(
        carrier
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect::<Map<String, Value>>(),
    );
    match params {
        Value::Object(fields) => {
            fields.insert(CARRIER_KEY.to_string(), carrier);
        }
        Value::Array(items) => match items.as_mut_slice() {
            [Value::Object(only)] => {
                only.insert(CARRIER_KEY.to_string(), carrier);
            }
            _ => items.push(carrier),
        },
        _ => {}
    }
}
