use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use crate::bound::BoundInterface;
use crate::descriptor::InterfaceDescriptor;
use crate::error::{CourierError, TemplateSyntaxError};
use crate::interceptor::InterceptorRegistry;
use crate::settings::Settings;
use crate::template::{self, CompiledTemplate};

/// Compiled templates keyed by source text.
#[derive(Default)]
pub struct TemplateCache {
    compiled: DashMap<String, CompiledTemplate>,
}

impl TemplateCache {
    pub fn compile(&self, text: &str) -> Result<CompiledTemplate, TemplateSyntaxError> {
        if let Some(t) = self.compiled.get(text) {
            return Ok(t.value().clone());
        }
        let t = template::compile(text)?;
        self.compiled
            .entry(text.to_string())
            .or_insert_with(|| t.clone());
        Ok(t)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Per-client caches: bound interfaces by name, interceptors by type,
/// templates by text.
#[derive(Default)]
pub struct Registry {
    interfaces: DashMap<String, Arc<BoundInterface>>,
    pub(crate) interceptors: InterceptorRegistry,
    pub(crate) templates: TemplateCache,
}

impl Registry {
    /// Binds `desc` on first use; later calls with the same interface name
    /// return the cached binding.
    pub fn get_or_bind(
        &self,
        desc: &InterfaceDescriptor,
        settings: &Settings,
    ) -> Result<Arc<BoundInterface>, CourierError> {
        if let Some(b) = self.interfaces.get(desc.interface_name()) {
            return Ok(b.value().clone());
        }
        match self.interfaces.entry(desc.interface_name().to_string()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(v) => {
                let bound = Arc::new(BoundInterface::bind(
                    desc,
                    settings,
                    &self.interceptors,
                    &self.templates,
                )?);
                tracing::debug!(
                    interface = desc.interface_name(),
                    methods = bound.method_count(),
                    "bound interface"
                );
                v.insert(bound.clone());
                Ok(bound)
            }
        }
    }

    pub fn interface(&self, name: &str) -> Option<Arc<BoundInterface>> {
        self.interfaces.get(name).map(|b| b.value().clone())
    }

    #[inline]
    pub fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }

    #[inline]
    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::MethodDescriptor;
    use crate::interceptor::{Interceptor, InterceptorSpec};
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn templates_are_compiled_once() {
        let cache = TemplateCache::default();
        let a = cache.compile("/users/${id}").unwrap();
        let b = cache.compile("/users/${id}").unwrap();
        assert_eq!(a.segments(), b.segments());
        assert_eq!(cache.len(), 1);
        assert!(cache.compile("${").is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn interfaces_are_bound_once_per_name() {
        let r = Registry::default();
        let settings = Settings::default();
        let desc = InterfaceDescriptor::new("Api")
            .method(MethodDescriptor::new("getUser").url("http://localhost/user"));
        let a = r.get_or_bind(&desc, &settings).unwrap();
        let b = r.get_or_bind(&desc, &settings).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(r.interface("Api").is_some());
        assert!(r.interface("Other").is_none());
    }

    #[test]
    fn bind_errors_are_not_cached() {
        let r = Registry::default();
        let settings = Settings::default();
        let bad = InterfaceDescriptor::new("Bad")
            .method(MethodDescriptor::new("get").url("/x/${"));
        assert!(r.get_or_bind(&bad, &settings).is_err());
        assert!(r.interface("Bad").is_none());
    }

    static AUDITS: AtomicUsize = AtomicUsize::new(0);

    struct Audit;

    impl Default for Audit {
        fn default() -> Self {
            AUDITS.fetch_add(1, Ordering::SeqCst);
            Audit
        }
    }

    impl Interceptor for Audit {}

    #[test]
    fn concurrent_first_binds_share_one_interface() {
        const THREADS: usize = 8;
        let r = Registry::default();
        let settings = Settings::default();
        let desc = InterfaceDescriptor::new("Shared")
            .interceptor(InterceptorSpec::of::<Audit>())
            .method(MethodDescriptor::new("getUser").url("http://localhost/user/${0}"));
        let barrier = Barrier::new(THREADS);

        let bound: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        r.get_or_bind(&desc, &settings).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(bound.iter().all(|b| Arc::ptr_eq(b, &bound[0])));
        assert_eq!(AUDITS.load(Ordering::SeqCst), 1);
        assert!(r.interceptors().get::<Audit>().is_some());
    }
}
