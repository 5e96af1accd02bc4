/*
    ValueFactory - pluggable decoders keyed by value type

    A factory turns (type, version, payload) into a `DhtValue`, validating
    the payload as it sees fit. Empty payloads always go to the default
    factory and come back as the empty value: that is how a delete looks
    regardless of the type it was sent with.
*/

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::dht_value::{DhtValue, ValueFrame, Version};
use super::errors::{DhtError, DhtResult};
use super::value_type::{ValueType, ValueTypeRegistry};

/// Builds values of one type from raw bytes
pub trait ValueFactory: Send + Sync {
    fn create(&self, value_type: &ValueType, version: Version, payload: &[u8])
        -> DhtResult<DhtValue>;
}

/// Wraps the payload as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValueFactory;

impl ValueFactory for DefaultValueFactory {
    fn create(
        &self,
        value_type: &ValueType,
        version: Version,
        payload: &[u8],
    ) -> DhtResult<DhtValue> {
        if payload.is_empty() {
            return Ok(DhtValue::empty());
        }
        DhtValue::new(value_type.clone(), version, payload.to_vec())
    }
}

/// Accepts UTF-8 payloads only
#[derive(Debug, Default, Clone, Copy)]
pub struct TextValueFactory;

impl ValueFactory for TextValueFactory {
    fn create(
        &self,
        value_type: &ValueType,
        version: Version,
        payload: &[u8],
    ) -> DhtResult<DhtValue> {
        std::str::from_utf8(payload)
            .map_err(|e| DhtError::Decode(format!("{} payload is not UTF-8: {}", value_type, e)))?;
        DhtValue::new(value_type.clone(), version, payload.to_vec())
    }
}

/// Routes decoding requests to the factory registered for the value type
pub struct ValueFactoryRegistry {
    default_factory: Arc<dyn ValueFactory>,
    factories: RwLock<HashMap<ValueType, Arc<dyn ValueFactory>>>,
}

impl ValueFactoryRegistry {
    pub fn new() -> Self {
        ValueFactoryRegistry {
            default_factory: Arc::new(DefaultValueFactory),
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register `factory` for `value_type`, returning the factory it replaced
    pub fn register(
        &self,
        value_type: ValueType,
        factory: Arc<dyn ValueFactory>,
    ) -> DhtResult<Option<Arc<dyn ValueFactory>>> {
        if value_type.is_any() {
            return Err(DhtError::Precondition(
                "cannot register a value factory for the ANY type".to_string(),
            ));
        }

        debug!(value_type = %value_type, "Registering value factory");
        let mut factories = self.factories.write().map_err(|e| DhtError::lock("factories", e))?;
        Ok(factories.insert(value_type, factory))
    }

    pub fn unregister(&self, value_type: &ValueType) -> DhtResult<Option<Arc<dyn ValueFactory>>> {
        let mut factories = self.factories.write().map_err(|e| DhtError::lock("factories", e))?;
        Ok(factories.remove(value_type))
    }

    /// The factory for `value_type`, falling back to the default factory
    pub fn factory(&self, value_type: &ValueType) -> DhtResult<Arc<dyn ValueFactory>> {
        let factories = self.factories.read().map_err(|e| DhtError::lock("factories", e))?;
        Ok(factories.get(value_type).cloned().unwrap_or_else(|| self.default_factory.clone()))
    }

    /// Build a value. Empty payloads always produce the empty value.
    pub fn create(
        &self,
        value_type: &ValueType,
        version: Version,
        payload: &[u8],
    ) -> DhtResult<DhtValue> {
        if payload.is_empty() {
            return self.default_factory.create(value_type, version, payload);
        }
        self.factory(value_type)?.create(value_type, version, payload)
    }

    /// Decode a serialized value frame
    pub fn read_value(&self, types: &ValueTypeRegistry, bytes: &[u8]) -> DhtResult<DhtValue> {
        let frame = ValueFrame::parse(bytes)?;
        let value_type = types.value_of(frame.code);
        self.create(&value_type, frame.version, frame.payload)
    }
}

impl Default for ValueFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
