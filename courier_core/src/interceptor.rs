use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::draft::RequestDraft;
use crate::error::CourierError;
use crate::response::Response;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop before sending; the call completes with no response.
    Abort,
}

/// Hooks run around each call, in the order global, interface, method.
pub trait Interceptor: Send + Sync + 'static {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Right after synthesis, with the call arguments.
    fn on_invoke(&self, _draft: &mut RequestDraft, _args: &[Value]) -> Result<(), CourierError> {
        Ok(())
    }

    fn before_execute(&self, _draft: &mut RequestDraft) -> Result<Flow, CourierError> {
        Ok(Flow::Continue)
    }

    fn after_execute(
        &self,
        _draft: &RequestDraft,
        _response: &Response,
    ) -> Result<(), CourierError> {
        Ok(())
    }

    fn on_success(&self, _draft: &RequestDraft, _response: &Response) {}

    fn on_error(&self, _draft: &RequestDraft, _error: &CourierError) {}
}

#[derive(Clone)]
pub(crate) struct InterceptorSlot {
    dynamic: Arc<dyn Interceptor>,
    any: Arc<dyn Any + Send + Sync>,
}

impl InterceptorSlot {
    fn new<I: Interceptor>(instance: Arc<I>) -> Self {
        Self {
            dynamic: instance.clone(),
            any: instance,
        }
    }
}

/// Reference to an interceptor type. Instances are created by the client's
/// registry, at most once per type.
#[derive(Clone)]
pub struct InterceptorSpec {
    type_id: TypeId,
    type_name: &'static str,
    create: Option<fn() -> InterceptorSlot>,
}

impl InterceptorSpec {
    pub fn of<I: Interceptor + Default>() -> Self {
        Self {
            type_id: TypeId::of::<I>(),
            type_name: std::any::type_name::<I>(),
            create: Some(|| InterceptorSlot::new(Arc::new(I::default()))),
        }
    }

    /// Type whose instance must be supplied to the registry up front.
    pub fn registered<I: Interceptor>() -> Self {
        Self {
            type_id: TypeId::of::<I>(),
            type_name: std::any::type_name::<I>(),
            create: None,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for InterceptorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InterceptorSpec")
            .field(&self.type_name)
            .finish()
    }
}

/// Process-wide interceptor instances, keyed by type.
#[derive(Default)]
pub struct InterceptorRegistry {
    slots: DashMap<TypeId, InterceptorSlot>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, spec: &InterceptorSpec) -> Result<Arc<dyn Interceptor>, CourierError> {
        if let Some(slot) = self.slots.get(&spec.type_id) {
            return Ok(slot.dynamic.clone());
        }
        let create = spec.create.ok_or_else(|| {
            CourierError::InvalidDescriptor(
                format!("interceptor {} has no registered instance", spec.type_name).into(),
            )
        })?;
        let slot = self.slots.entry(spec.type_id).or_insert_with(|| {
            tracing::debug!(interceptor = spec.type_name, "creating interceptor");
            create()
        });
        Ok(slot.dynamic.clone())
    }

    /// Supplies a pre-built instance. An existing instance of the same type
    /// is kept.
    pub fn register<I: Interceptor>(&self, instance: Arc<I>) -> Arc<I> {
        let slot = self
            .slots
            .entry(TypeId::of::<I>())
            .or_insert_with(|| InterceptorSlot::new(instance.clone()));
        slot.any
            .clone()
            .downcast::<I>()
            .unwrap_or(instance)
    }

    pub fn get<I: Interceptor>(&self) -> Option<Arc<I>> {
        self.slots
            .get(&TypeId::of::<I>())
            .and_then(|slot| slot.any.clone().downcast::<I>().ok())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CREATED: AtomicUsize = AtomicUsize::new(0);

    struct Counting;

    impl Default for Counting {
        fn default() -> Self {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Counting
        }
    }

    impl Interceptor for Counting {}

    struct NeedsConfig {
        token: String,
    }

    impl Interceptor for NeedsConfig {}

    #[test]
    fn one_instance_per_type() {
        let r = InterceptorRegistry::new();
        let spec = InterceptorSpec::of::<Counting>();
        let a = r.get_or_create(&spec).unwrap();
        let b = r.get_or_create(&spec).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
        assert_eq!(r.len(), 1);
        assert!(r.get::<Counting>().is_some());
        assert!(a.name().ends_with("Counting"));
    }

    #[test]
    fn registered_specs_need_an_instance() {
        let r = InterceptorRegistry::new();
        let spec = InterceptorSpec::registered::<NeedsConfig>();
        assert!(matches!(
            r.get_or_create(&spec),
            Err(CourierError::InvalidDescriptor(_))
        ));
        r.register(Arc::new(NeedsConfig {
            token: "t".into(),
        }));
        assert!(r.get_or_create(&spec).is_ok());
        assert_eq!(r.get::<NeedsConfig>().unwrap().token, "t");
    }

    static RACED: AtomicUsize = AtomicUsize::new(0);

    struct Raced;

    impl Default for Raced {
        fn default() -> Self {
            RACED.fetch_add(1, Ordering::SeqCst);
            Raced
        }
    }

    impl Interceptor for Raced {}

    #[test]
    fn concurrent_first_access_creates_one_instance() {
        const THREADS: usize = 8;
        let r = InterceptorRegistry::new();
        let spec = InterceptorSpec::of::<Raced>();
        let barrier = std::sync::Barrier::new(THREADS);

        let got: Vec<Arc<dyn Interceptor>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        r.get_or_create(&spec).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(got.iter().all(|i| Arc::ptr_eq(i, &got[0])));
        assert_eq!(RACED.load(Ordering::SeqCst), 1);
        assert_eq!(r.len(), 1);
    }
}
