//! Typed handles onto engine objects.
//!
//! A proxy is nothing but an address plus a sink to send commands to; building
//! one never talks to the engine.

use std::{fmt, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::{Address, Segment},
    protocol::{Command, Request},
};

use crate::{channel::CommandChannel, dispatch::DispatchQueue, error::DispatchError};

/// Where proxy commands are sent.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn execute(&self, command: Command) -> Result<Value, DispatchError>;
}

#[async_trait]
impl CommandSink for CommandChannel {
    async fn execute(&self, command: Command) -> Result<Value, DispatchError> {
        Ok(self.send(&command).await?)
    }
}

/// Proxy traffic is ordered with UI commands but never triggers a render by
/// itself; a stale view is still repainted.
#[async_trait]
impl CommandSink for DispatchQueue {
    async fn execute(&self, command: Command) -> Result<Value, DispatchError> {
        self.submit(Request::structural(command).without_render()).await
    }
}

#[derive(Clone)]
pub struct ObjectProxy {
    address: Address,
    sink: Arc<dyn CommandSink>,
}

impl ObjectProxy {
    pub fn new(address: Address, sink: Arc<dyn CommandSink>) -> Self {
        Self { address, sink }
    }

    /// Handle on the engine's top-level object, `/minsky`.
    pub fn root(sink: Arc<dyn CommandSink>) -> Self {
        Self::new(Address::root().field("minsky"), sink)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn child(&self, field: impl Into<String>) -> Self {
        self.at(self.address.field(field))
    }

    fn at(&self, address: Address) -> Self {
        Self::new(address, self.sink.clone())
    }

    pub fn command(&self, method: &str, args: Vec<Value>) -> Command {
        Command::new(self.address.clone(), method, args)
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, DispatchError> {
        self.sink.execute(self.command(method, args)).await
    }

    /// Calls `method` and deserializes the reply.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, DispatchError> {
        let value = self.call(method, args).await?;
        decode(value)
    }

    /// Reads the whole object, or writes it when `args` is non-empty.
    pub async fn properties(&self, args: Vec<Value>) -> Result<Value, DispatchError> {
        self.sink
            .execute(Command::bare(self.address.clone(), args))
            .await
    }

    /// Names of the object's members.
    pub async fn list(&self) -> Result<Vec<String>, DispatchError> {
        self.pseudo(Segment::List, Vec::new()).await.and_then(decode)
    }

    pub async fn type_name(&self) -> Result<String, DispatchError> {
        self.pseudo(Segment::Type, Vec::new()).await.and_then(decode)
    }

    pub async fn signature(&self, method: &str) -> Result<Value, DispatchError> {
        self.child(method).pseudo(Segment::Signature, Vec::new()).await
    }

    async fn pseudo(&self, op: Segment, args: Vec<Value>) -> Result<Value, DispatchError> {
        self.sink
            .execute(Command::bare(self.address.join(op), args))
            .await
    }
}

impl fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectProxy").field(&self.address.to_string()).finish()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, DispatchError> {
    serde_json::from_value(value).map_err(|err| DispatchError::Decode(err.to_string()))
}

/// Engine-side container addressed by keys of type `K`.
pub struct ContainerProxy<K> {
    object: ObjectProxy,
    _key: PhantomData<fn(K)>,
}

/// Vector-like container indexed by position.
pub type SequenceProxy = ContainerProxy<usize>;

impl<K: Into<Value>> ContainerProxy<K> {
    pub fn new(object: ObjectProxy) -> Self {
        Self {
            object,
            _key: PhantomData,
        }
    }

    pub fn object(&self) -> &ObjectProxy {
        &self.object
    }

    pub fn elem(&self, key: K) -> ObjectProxy {
        self.object.at(self.object.address.join(Segment::elem(key)))
    }

    pub async fn insert(&self, value: Value) -> Result<Value, DispatchError> {
        self.object.pseudo(Segment::Insert, vec![value]).await
    }

    pub async fn erase(&self, key: K) -> Result<Value, DispatchError> {
        self.object.pseudo(Segment::Erase, vec![key.into()]).await
    }

    pub async fn size(&self) -> Result<usize, DispatchError> {
        self.object.pseudo(Segment::Size, Vec::new()).await.and_then(decode)
    }

    pub async fn keys(&self) -> Result<Vec<Value>, DispatchError> {
        self.object.pseudo(Segment::Keys, Vec::new()).await.and_then(decode)
    }
}

/// Engine-side associative container. Values live at `@elem/<key>/second`.
pub struct MapProxy<K> {
    container: ContainerProxy<K>,
}

impl<K: Into<Value>> MapProxy<K> {
    pub fn new(object: ObjectProxy) -> Self {
        Self {
            container: ContainerProxy::new(object),
        }
    }

    pub fn object(&self) -> &ObjectProxy {
        self.container.object()
    }

    pub fn elem(&self, key: K) -> ObjectProxy {
        self.container.elem(key).child("second")
    }

    /// Reads the value stored under `key`.
    pub async fn get(&self, key: K) -> Result<Value, DispatchError> {
        self.elem(key).properties(Vec::new()).await
    }

    pub async fn insert(&self, key: K, value: Value) -> Result<Value, DispatchError> {
        self.container
            .insert(json!({ "first": key.into(), "second": value }))
            .await
    }

    pub async fn erase(&self, key: K) -> Result<Value, DispatchError> {
        self.container.erase(key).await
    }

    pub async fn size(&self) -> Result<usize, DispatchError> {
        self.container.size().await
    }

    pub async fn keys(&self) -> Result<Vec<Value>, DispatchError> {
        self.container.keys().await
    }
}
