//! Data fetchers and the registry that maps fields to them.
//!
//! A [`DataFetcher`] is called synchronously and hands back a boxed future. Anything the
//! fetcher does before returning (queueing a data loader key, say) has happened by the
//! time the engine reports the fetch as dispatched, which is what lets the data loader
//! dispatch instrumentation batch sibling fetches together.

mod batched;

pub use batched::{BatchedDataFetcher, SingleSourceFetcher, UnbatchedDataFetcher};

use crate::dataloader::{DataLoader, DataLoaderRegistry};
use crate::error::{FieldError, GraphQLError};
use crate::execution::{Context, ExecutionContext, ExecutionStepInfo, MergedField};
use crate::introspection;
use crate::path::ResultPath;
use crate::reactive::Publisher;
use crate::schema::{FieldDef, Schema};
use crate::values::{Arguments, Variables};
use futures::future::{self, BoxFuture, FutureExt};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Opaque per-field context handed from a fetcher to the fetchers of its sub-fields.
pub type LocalContext = Arc<dyn Any + Send + Sync>;

/// Result type for data fetchers.
pub type FetchResult = Result<DataFetcherResult, FieldError>;

/// A fetched value with optional local context and partial errors.
#[derive(Clone, Default)]
pub struct DataFetcherResult {
    pub data: Value,
    pub local_context: Option<LocalContext>,
    pub errors: Vec<GraphQLError>,
}

impl DataFetcherResult {
    /// Creates a new result holding `data`.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            local_context: None,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_local_context(mut self, local_context: LocalContext) -> Self {
        self.local_context = Some(local_context);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: GraphQLError) -> Self {
        self.errors.push(error);
        self
    }
}

impl fmt::Debug for DataFetcherResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFetcherResult")
            .field("data", &self.data)
            .field("has_local_context", &self.local_context.is_some())
            .field("errors", &self.errors)
            .finish()
    }
}

impl From<Value> for DataFetcherResult {
    fn from(data: Value) -> Self {
        Self::new(data)
    }
}

/// Everything a data fetcher may read about the field it is fetching.
#[derive(Clone)]
pub struct DataFetchingEnvironment {
    execution_context: Arc<ExecutionContext>,
    source: Value,
    local_context: Option<LocalContext>,
    step_info: Arc<ExecutionStepInfo>,
}

impl fmt::Debug for DataFetchingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFetchingEnvironment")
            .field("path", &self.step_info.path().to_string())
            .field("source", &self.source)
            .finish()
    }
}

impl DataFetchingEnvironment {
    pub(crate) fn new(
        execution_context: Arc<ExecutionContext>,
        source: Value,
        local_context: Option<LocalContext>,
        step_info: Arc<ExecutionStepInfo>,
    ) -> Self {
        Self {
            execution_context,
            source,
            local_context,
            step_info,
        }
    }

    /// The same environment over a different source object.
    #[must_use]
    pub fn with_source(&self, source: Value) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    /// The parent object.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Gets an argument as a specific type.
    pub fn argument<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.step_info.arguments().get_as(name)
    }

    pub fn arguments(&self) -> &Arguments {
        self.step_info.arguments()
    }

    /// The request context.
    pub fn context(&self) -> &Context {
        self.execution_context.context()
    }

    pub fn local_context(&self) -> Option<&LocalContext> {
        self.local_context.as_ref()
    }

    /// The local context downcast to `T`.
    pub fn local_context_as<T: Any>(&self) -> Option<&T> {
        self.local_context.as_ref()?.downcast_ref::<T>()
    }

    pub fn step_info(&self) -> &Arc<ExecutionStepInfo> {
        &self.step_info
    }

    pub fn path(&self) -> &ResultPath {
        self.step_info.path()
    }

    pub fn field(&self) -> Option<&MergedField> {
        self.step_info.field()
    }

    /// The name of the field being fetched (not its alias).
    pub fn field_name(&self) -> &str {
        self.step_info
            .field_definition()
            .map(|definition| definition.name.as_str())
            .unwrap_or_default()
    }

    pub fn field_definition(&self) -> Option<&FieldDef> {
        self.step_info.field_definition()
    }

    pub fn parent_type(&self) -> Option<&str> {
        self.step_info.parent_type()
    }

    pub fn variables(&self) -> &Variables {
        self.execution_context.variables()
    }

    pub fn root(&self) -> &Value {
        self.execution_context.root_value()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.execution_context.schema()
    }

    pub fn execution_context(&self) -> &Arc<ExecutionContext> {
        &self.execution_context
    }

    pub fn data_loader_registry(&self) -> &DataLoaderRegistry {
        self.execution_context.data_loader_registry()
    }

    /// The registered loader `name`, if it has these key and value types.
    pub fn data_loader<K, V>(&self, name: &str) -> Option<DataLoader<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.data_loader_registry().get(name)
    }
}

/// Fetches the value of one field.
pub trait DataFetcher: Send + Sync + 'static {
    /// Starts fetching. Work done before returning counts as dispatched.
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult>;
}

impl DataFetcher for Arc<dyn DataFetcher> {
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult> {
        (**self).get(env)
    }
}

/// A sync data fetcher function.
pub type SyncFetcherFn =
    Arc<dyn Fn(&DataFetchingEnvironment) -> Result<Value, FieldError> + Send + Sync>;

/// A wrapper for sync data fetcher functions.
pub struct FnDataFetcher {
    func: SyncFetcherFn,
}

impl FnDataFetcher {
    /// Creates a new function data fetcher.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&DataFetchingEnvironment) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl DataFetcher for FnDataFetcher {
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult> {
        let result = (self.func)(&env).map(DataFetcherResult::new);
        future::ready(result).boxed()
    }
}

/// A wrapper for async data fetcher functions.
///
/// The closure itself runs when the field is fetched; only the future it returns is
/// awaited later. Data loader keys should be queued in the closure body, not inside the
/// returned future.
pub struct AsyncFnDataFetcher {
    func: Arc<dyn Fn(DataFetchingEnvironment) -> BoxFuture<'static, Result<Value, FieldError>> + Send + Sync>,
}

impl AsyncFnDataFetcher {
    /// Creates a new async function data fetcher.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(DataFetchingEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |env| f(env).boxed()),
        }
    }
}

impl DataFetcher for AsyncFnDataFetcher {
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult> {
        (self.func)(env)
            .map(|result| result.map(DataFetcherResult::new))
            .boxed()
    }
}

/// Reads a property of the source object.
///
/// Without an explicit property the field name is used, falling back to its snake_case
/// form.
#[derive(Debug, Clone, Default)]
pub struct PropertyDataFetcher {
    property: Option<String>,
}

impl PropertyDataFetcher {
    /// A fetcher reading `property` whatever the field is called.
    pub fn fetching(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
        }
    }

    fn read(&self, source: &Value, field_name: &str) -> Result<Value, FieldError> {
        let name = self.property.as_deref().unwrap_or(field_name);
        match source {
            Value::Object(map) => Ok(map
                .get(name)
                .or_else(|| map.get(&to_snake_case(name)))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            _ => Err(FieldError::new(format!("Field not found: {name}"))),
        }
    }
}

impl DataFetcher for PropertyDataFetcher {
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult> {
        let result = self
            .read(env.source(), env.field_name())
            .map(DataFetcherResult::new);
        future::ready(result).boxed()
    }
}

/// Converts camelCase to snake_case.
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// How a registered fetcher produces its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherKind {
    /// Fetches one source at a time.
    Plain,
    /// Written against whole lists of sources.
    BatchedNative,
    /// A per-source fetcher run over lists by [`UnbatchedDataFetcher`].
    BatchedAdapted,
}

/// A fetcher together with its kind.
#[derive(Clone)]
pub struct RegisteredFetcher {
    pub kind: FetcherKind,
    pub fetcher: Arc<dyn DataFetcher>,
}

impl fmt::Debug for RegisteredFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFetcher")
            .field("kind", &self.kind)
            .finish()
    }
}

/// Picks the object type of a value of an abstract type.
pub trait TypeResolver: Send + Sync + 'static {
    fn resolve_type(&self, value: &Value, abstract_type: &str, schema: &Schema) -> Option<String>;
}

impl<F> TypeResolver for F
where
    F: Fn(&Value, &Schema) -> Option<String> + Send + Sync + 'static,
{
    fn resolve_type(&self, value: &Value, _abstract_type: &str, schema: &Schema) -> Option<String> {
        self(value, schema)
    }
}

/// Resolves objects by their `__typename` property.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypenameTypeResolver;

impl TypeResolver for TypenameTypeResolver {
    fn resolve_type(&self, value: &Value, _abstract_type: &str, _schema: &Schema) -> Option<String> {
        value
            .get(introspection::TYPENAME_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Produces the event stream of a subscription field.
pub trait SubscriptionSource: Send + Sync + 'static {
    fn subscribe(&self, env: DataFetchingEnvironment) -> Result<Arc<dyn Publisher<Value>>, FieldError>;
}

impl<F> SubscriptionSource for F
where
    F: Fn(DataFetchingEnvironment) -> Result<Arc<dyn Publisher<Value>>, FieldError>
        + Send
        + Sync
        + 'static,
{
    fn subscribe(&self, env: DataFetchingEnvironment) -> Result<Arc<dyn Publisher<Value>>, FieldError> {
        self(env)
    }
}

/// Data fetchers, type resolvers and subscription sources by type and field.
pub struct CodeRegistry {
    /// Fetchers indexed by "TypeName.fieldName".
    fetchers: FxHashMap<String, RegisteredFetcher>,
    default_fetcher: Arc<dyn DataFetcher>,
    type_resolvers: FxHashMap<String, Arc<dyn TypeResolver>>,
    default_type_resolver: Arc<dyn TypeResolver>,
    subscription_sources: FxHashMap<String, Arc<dyn SubscriptionSource>>,
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeRegistry")
            .field("fetcher_count", &self.fetchers.len())
            .field("type_resolver_count", &self.type_resolvers.len())
            .field("subscription_count", &self.subscription_sources.len())
            .finish()
    }
}

fn key(type_name: &str, field_name: &str) -> String {
    format!("{}.{}", type_name, field_name)
}

impl CodeRegistry {
    /// Creates a registry holding the introspection fetchers.
    pub fn new() -> Self {
        let mut registry = Self {
            fetchers: FxHashMap::default(),
            default_fetcher: Arc::new(PropertyDataFetcher::default()),
            type_resolvers: FxHashMap::default(),
            default_type_resolver: Arc::new(TypenameTypeResolver),
            subscription_sources: FxHashMap::default(),
        };
        introspection::register_fetchers(&mut registry);
        registry
    }

    fn insert(&mut self, type_name: &str, field_name: &str, kind: FetcherKind, fetcher: Arc<dyn DataFetcher>) {
        self.fetchers
            .insert(key(type_name, field_name), RegisteredFetcher { kind, fetcher });
    }

    /// Registers a data fetcher for a specific type and field.
    pub fn register<F: DataFetcher>(&mut self, type_name: &str, field_name: &str, fetcher: F) -> &mut Self {
        self.insert(type_name, field_name, FetcherKind::Plain, Arc::new(fetcher));
        self
    }

    /// Registers a sync function as a data fetcher.
    pub fn register_fn<F>(&mut self, type_name: &str, field_name: &str, f: F) -> &mut Self
    where
        F: Fn(&DataFetchingEnvironment) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        self.register(type_name, field_name, FnDataFetcher::new(f))
    }

    /// Registers an async function as a data fetcher.
    pub fn register_async<F, Fut>(&mut self, type_name: &str, field_name: &str, f: F) -> &mut Self
    where
        F: Fn(DataFetchingEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
    {
        self.register(type_name, field_name, AsyncFnDataFetcher::new(f))
    }

    /// Registers a fetcher written against lists of sources.
    pub fn register_batched<F: BatchedDataFetcher>(
        &mut self,
        type_name: &str,
        field_name: &str,
        fetcher: F,
    ) -> &mut Self {
        let bridge = SingleSourceFetcher::new(Arc::new(fetcher));
        self.insert(type_name, field_name, FetcherKind::BatchedNative, Arc::new(bridge));
        self
    }

    /// Registers a per-source fetcher to be run through the batched path.
    pub fn register_adapted<F: DataFetcher>(
        &mut self,
        type_name: &str,
        field_name: &str,
        fetcher: F,
    ) -> &mut Self {
        let adapted = UnbatchedDataFetcher::new(Arc::new(fetcher));
        let bridge = SingleSourceFetcher::new(Arc::new(adapted));
        self.insert(type_name, field_name, FetcherKind::BatchedAdapted, Arc::new(bridge));
        self
    }

    /// Sets the fetcher used for fields nothing was registered for.
    pub fn set_default_fetcher<F: DataFetcher>(&mut self, fetcher: F) -> &mut Self {
        self.default_fetcher = Arc::new(fetcher);
        self
    }

    /// Registers how values of an abstract type find their object type.
    pub fn register_type_resolver<R: TypeResolver>(&mut self, type_name: &str, resolver: R) -> &mut Self {
        self.type_resolvers
            .insert(type_name.to_string(), Arc::new(resolver));
        self
    }

    /// Registers the event source of a subscription field.
    pub fn register_subscription<S: SubscriptionSource>(
        &mut self,
        type_name: &str,
        field_name: &str,
        source: S,
    ) -> &mut Self {
        self.subscription_sources
            .insert(key(type_name, field_name), Arc::new(source));
        self
    }

    /// Gets the fetcher for a type and field, falling back to the default.
    pub fn fetcher(&self, type_name: &str, field_name: &str) -> RegisteredFetcher {
        if let Some(registered) = self.fetchers.get(&key(type_name, field_name)) {
            return registered.clone();
        }
        let fetcher = introspection::meta_field_fetcher(field_name)
            .unwrap_or_else(|| Arc::clone(&self.default_fetcher));
        RegisteredFetcher {
            kind: FetcherKind::Plain,
            fetcher,
        }
    }

    /// The kind recorded for a registered fetcher.
    pub fn fetcher_kind(&self, type_name: &str, field_name: &str) -> Option<FetcherKind> {
        self.fetchers
            .get(&key(type_name, field_name))
            .map(|registered| registered.kind)
    }

    pub fn type_resolver(&self, type_name: &str) -> &dyn TypeResolver {
        self.type_resolvers
            .get(type_name)
            .map(|r| r.as_ref())
            .unwrap_or(self.default_type_resolver.as_ref())
    }

    pub fn subscription_source(&self, type_name: &str, field_name: &str) -> Option<Arc<dyn SubscriptionSource>> {
        self.subscription_sources
            .get(&key(type_name, field_name))
            .cloned()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::execution::test_support::{execution_context, query_operation};
    use crate::schema::{ObjectDef, SchemaBuilder, TypeDef, TypeRef};

    /// An environment fetching `field` of `User` from `source`.
    pub(crate) fn environment(field: &str, source: Value) -> DataFetchingEnvironment {
        let schema = SchemaBuilder::new()
            .query_type("Query")
            .add_type(TypeDef::Object(
                ObjectDef::new("User").field(FieldDef::new(field, TypeRef::named("String"))),
            ))
            .build();
        let ctx = execution_context(schema, query_operation(), DataLoaderRegistry::new());
        let root = Arc::new(ExecutionStepInfo::root(TypeRef::named_non_null("User")));
        let step_info = ExecutionStepInfo::for_field(
            &root,
            MergedField::new(crate::document::Field::new(field)),
            FieldDef::new(field, TypeRef::named("String")),
            "User",
            Arguments::new(),
        );
        DataFetchingEnvironment::new(Arc::new(ctx), source, None, Arc::new(step_info))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::environment;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("firstName"), "first_name");
        assert_eq!(to_snake_case("id"), "id");
        assert_eq!(to_snake_case("ID"), "i_d");
    }

    #[tokio::test]
    async fn test_property_fetcher() {
        let fetcher = PropertyDataFetcher::default();
        let env = environment("firstName", json!({"first_name": "Ada"}));
        assert_eq!(fetcher.get(env).await.unwrap().data, json!("Ada"));

        let env = environment("firstName", json!(null));
        assert_eq!(fetcher.get(env).await.unwrap().data, json!(null));

        let env = environment("firstName", json!(3));
        assert!(fetcher.get(env).await.is_err());
    }

    #[tokio::test]
    async fn test_fixed_property_fetcher() {
        let fetcher = PropertyDataFetcher::fetching("label");
        let env = environment("name", json!({"label": "x", "name": "y"}));
        assert_eq!(fetcher.get(env).await.unwrap().data, json!("x"));
    }

    #[tokio::test]
    async fn test_fn_and_async_fetchers() {
        let sync = FnDataFetcher::new(|env| Ok(json!(env.field_name())));
        assert_eq!(
            sync.get(environment("hello", json!({}))).await.unwrap().data,
            json!("hello")
        );

        let fetcher = AsyncFnDataFetcher::new(|env: DataFetchingEnvironment| async move {
            Ok(env.source()["n"].clone())
        });
        assert_eq!(
            fetcher.get(environment("n", json!({"n": 1}))).await.unwrap().data,
            json!(1)
        );
    }

    #[test]
    fn test_registry_kinds() {
        let mut registry = CodeRegistry::new();
        registry
            .register_fn("Query", "a", |_| Ok(json!(1)))
            .register_adapted("Query", "b", PropertyDataFetcher::default());

        assert_eq!(registry.fetcher_kind("Query", "a"), Some(FetcherKind::Plain));
        assert_eq!(registry.fetcher_kind("Query", "b"), Some(FetcherKind::BatchedAdapted));
        assert_eq!(registry.fetcher_kind("Query", "c"), None);
        assert_eq!(registry.fetcher("Query", "c").kind, FetcherKind::Plain);
    }

    #[test]
    fn test_default_type_resolver_reads_typename() {
        let registry = CodeRegistry::new();
        let schema = Schema::default();
        let resolved = registry
            .type_resolver("Node")
            .resolve_type(&json!({"__typename": "User"}), "Node", &schema);
        assert_eq!(resolved.as_deref(), Some("User"));
    }

    #[test]
    fn test_environment_accessors() {
        let env = environment("name", json!({"name": "Ada"}));
        assert_eq!(env.parent_type(), Some("User"));
        assert_eq!(env.path().to_string(), "/name");
        assert!(env.local_context().is_none());
        let moved = env.with_source(json!({"name": "Grace"}));
        assert_eq!(moved.source()["name"], "Grace");
        assert!(env.data_loader::<u32, String>("users").is_none());
    }
}
