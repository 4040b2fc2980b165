mod assemble;
mod binder;
mod bound;
mod callback;
mod client;
mod codec;
mod debug;
mod descriptor;
mod draft;
pub mod error;
mod filter;
mod interceptor;
mod registry;
mod render;
mod request;
mod response;
mod retry;
mod scope;
mod settings;
mod synth;
pub mod template;
mod timeout;
pub mod transport;
mod urls;
mod value;
mod verb;

pub mod prelude {
    pub use crate::bound::{BoundInterface, BoundMethod};
    pub use crate::callback::{Callback, CallbackKind, Callbacks, Cookie, Cookies, Progress};
    pub use crate::client::{Api, Courier, Reply};
    pub use crate::codec::{
        Codecs, Format, JsonConverter, PropertyAccessor, SerdeJsonConverter, XmlConverter,
    };
    pub use crate::debug::{DebugLevel, DebugSink, NoopDebugSink, StderrDebugSink, TracingDebugSink};
    pub use crate::descriptor::{
        DataType, InterfaceDescriptor, MethodDescriptor, MultipartDescriptor, ParamKind,
        ParameterDescriptor, Returns, Target,
    };
    pub use crate::draft::{Multipart, NameValueEntry, RequestDraft};
    pub use crate::error::{CourierError, FxError, TemplateSyntaxError};
    pub use crate::filter::{Filter, FilterContext, FilterRegistry, filter_fn};
    pub use crate::interceptor::{Flow, Interceptor, InterceptorRegistry, InterceptorSpec};
    pub use crate::registry::{Registry, TemplateCache};
    pub use crate::render::Renderer;
    pub use crate::request::PendingCall;
    pub use crate::response::Response;
    pub use crate::retry::{BackoffRetryer, RetryDecision, RetryState, Retryer};
    pub use crate::scope::{IterationScope, ScopeChain, VariableScope, Variables};
    pub use crate::settings::{Settings, SettingsBuilder, SettingsFile};
    pub use crate::synth::Synthesizer;
    pub use crate::template::{CompiledTemplate, compile};
    pub use crate::timeout::TimeoutOverride;
    #[cfg(feature = "reqwest")]
    pub use crate::transport::ReqwestTransport;
    pub use crate::transport::{
        BuiltRequest, RequestMeta, Transport, TransportBody, TransportError, TransportErrorKind,
        TransportResponse,
    };
    pub use crate::value::{ObjectArg, ObjectValue, Value};
}
