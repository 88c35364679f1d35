//! Shared fixtures: a few small extension points with implementations,
//! plus helpers building systems around them.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use neomind_spi::extension::{ExtensionSystemBuilder, Injector};
use neomind_spi::prelude::*;
use parking_lot::RwLock;

pub fn init_logging() {
    neomind_spi::logging::init_for_tests();
}

pub fn url(s: &str) -> Url {
    s.parse().unwrap()
}

// ============================================================================
// Protocol: adaptive by the `protocol` key
// ============================================================================

pub trait Protocol: Extension {
    fn name(&self) -> String;
    fn export(&self, url: &Url) -> anyhow::Result<String>;
}

impl ExtensionPoint for dyn Protocol {
    const NAME: &'static str = "neomind.rpc.Protocol";
    const DEFAULT: Option<&'static str> = Some("http");

    fn adaptive_methods() -> Vec<AdaptiveMethod> {
        vec![
            AdaptiveMethod::new("export").keys(&["protocol"]).context_argument(0),
            AdaptiveMethod::unsupported("name"),
        ]
    }

    fn adaptive(dispatcher: AdaptiveDispatcher<Self>) -> Option<Arc<Self>> {
        Some(Arc::new(AdaptiveProtocol { dispatcher }))
    }
}

pub struct AdaptiveProtocol {
    dispatcher: AdaptiveDispatcher<dyn Protocol>,
}

impl Extension for AdaptiveProtocol {}

impl Protocol for AdaptiveProtocol {
    fn name(&self) -> String {
        self.dispatcher.unsupported("name").to_string()
    }

    fn export(&self, url: &Url) -> anyhow::Result<String> {
        self.dispatcher.select("export", Some(url))?.export(url)
    }
}

pub struct HttpProtocol;

impl Extension for HttpProtocol {}

impl Protocol for HttpProtocol {
    fn name(&self) -> String {
        "http".to_string()
    }

    fn export(&self, url: &Url) -> anyhow::Result<String> {
        Ok(format!("http://{}", url.host()))
    }
}

pub struct GrpcProtocol;

impl Extension for GrpcProtocol {}

impl Protocol for GrpcProtocol {
    fn name(&self) -> String {
        "grpc".to_string()
    }

    fn export(&self, url: &Url) -> anyhow::Result<String> {
        Ok(format!("grpc://{}", url.host()))
    }
}

/// Records the decoration chain in `name()`: `outer(inner(http))`.
pub struct LabelWrapper {
    label: &'static str,
    inner: Arc<dyn Protocol>,
}

impl Extension for LabelWrapper {}

impl Protocol for LabelWrapper {
    fn name(&self) -> String {
        format!("{}({})", self.label, self.inner.name())
    }

    fn export(&self, url: &Url) -> anyhow::Result<String> {
        self.inner.export(url)
    }
}

/// A wrapper with its own dependency: `codec(http)` once the codec is wired.
pub struct CodecWrapper {
    inner: Arc<dyn Protocol>,
    codec: RwLock<Option<Arc<dyn Codec>>>,
}

impl Extension for CodecWrapper {
    fn inject(&self, injector: &Injector<'_>) {
        injector.inject("codec", |codec: Arc<dyn Codec>| {
            *self.codec.write() = Some(codec);
            Ok(())
        });
    }
}

impl Protocol for CodecWrapper {
    fn name(&self) -> String {
        let label = if self.codec.read().is_some() { "codec" } else { "bare" };
        format!("{}({})", label, self.inner.name())
    }

    fn export(&self, url: &Url) -> anyhow::Result<String> {
        let exported = self.inner.export(url)?;
        match self.codec.read().clone() {
            Some(codec) => codec.encode(url, &exported),
            None => Ok(exported),
        }
    }
}

pub fn codec_wrapper(inner: Arc<dyn Protocol>) -> Arc<dyn Protocol> {
    Arc::new(CodecWrapper {
        inner,
        codec: RwLock::new(None),
    })
}

pub fn http() -> Arc<dyn Protocol> {
    Arc::new(HttpProtocol)
}

pub fn grpc() -> Arc<dyn Protocol> {
    Arc::new(GrpcProtocol)
}

pub fn wrapper(label: &'static str) -> impl Fn(Arc<dyn Protocol>) -> Arc<dyn Protocol> + Send + Sync {
    move |inner| Arc::new(LabelWrapper { label, inner }) as Arc<dyn Protocol>
}

/// Builds a protocol and counts the calls, slowly enough to expose races.
pub fn counting_protocol(
    counter: &Arc<AtomicUsize>,
) -> impl Fn() -> Arc<dyn Protocol> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Arc::new(HttpProtocol) as Arc<dyn Protocol>
    }
}

pub const PROTOCOL_DECLARATIONS: &str = "\
# protocols
http=test.HttpProtocol
grpc=test.GrpcProtocol
";

// ============================================================================
// Codec: adaptive by the `codec` key, default `json`
// ============================================================================

pub trait Codec: Extension {
    fn encode(&self, url: &Url, payload: &str) -> anyhow::Result<String>;
}

impl ExtensionPoint for dyn Codec {
    const NAME: &'static str = "neomind.remoting.Codec";
    const DEFAULT: Option<&'static str> = Some("json");

    fn adaptive_methods() -> Vec<AdaptiveMethod> {
        vec![AdaptiveMethod::new("encode").keys(&["codec"]).context_argument(0)]
    }

    fn adaptive(dispatcher: AdaptiveDispatcher<Self>) -> Option<Arc<Self>> {
        Some(Arc::new(AdaptiveCodec { dispatcher }))
    }
}

pub struct AdaptiveCodec {
    dispatcher: AdaptiveDispatcher<dyn Codec>,
}

impl Extension for AdaptiveCodec {}

impl Codec for AdaptiveCodec {
    fn encode(&self, url: &Url, payload: &str) -> anyhow::Result<String> {
        self.dispatcher.select("encode", Some(url))?.encode(url, payload)
    }
}

pub struct JsonCodec;

impl Extension for JsonCodec {}

impl Codec for JsonCodec {
    fn encode(&self, _url: &Url, payload: &str) -> anyhow::Result<String> {
        Ok(format!("{{\"payload\":\"{}\"}}", payload))
    }
}

pub struct TextCodec;

impl Extension for TextCodec {}

impl Codec for TextCodec {
    fn encode(&self, _url: &Url, payload: &str) -> anyhow::Result<String> {
        Ok(payload.to_string())
    }
}

/// A hand-written adaptive codec that always encodes as text.
pub struct FixedCodec;

impl Extension for FixedCodec {}

impl Codec for FixedCodec {
    fn encode(&self, _url: &Url, payload: &str) -> anyhow::Result<String> {
        Ok(format!("fixed:{}", payload))
    }
}

pub const CODEC_DECLARATIONS: &str = "\
json=test.JsonCodec
text=test.TextCodec
";

// ============================================================================
// Transport: consumes a codec and settings through injection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub buffer: usize,
}

pub trait Transport: Extension {
    fn send(&self, url: &Url, payload: &str) -> anyhow::Result<String>;
    fn settings(&self) -> Option<Arc<TransportSettings>>;
    fn has_codec(&self) -> bool;
    fn initialized(&self) -> bool;
}

impl ExtensionPoint for dyn Transport {
    const NAME: &'static str = "neomind.remoting.Transport";
    const DEFAULT: Option<&'static str> = Some("tcp");
}

#[derive(Default)]
pub struct TcpTransport {
    codec: RwLock<Option<Arc<dyn Codec>>>,
    settings: RwLock<Option<Arc<TransportSettings>>>,
    initialized: AtomicBool,
}

impl Extension for TcpTransport {
    fn inject(&self, injector: &Injector<'_>) {
        injector.inject("codec", |codec: Arc<dyn Codec>| {
            *self.codec.write() = Some(codec);
            Ok(())
        });
        injector.inject_object("settings", |settings: Arc<TransportSettings>| {
            *self.settings.write() = Some(settings);
            Ok(())
        });
    }

    fn initialize(&self) -> anyhow::Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn send(&self, url: &Url, payload: &str) -> anyhow::Result<String> {
        let codec = self
            .codec
            .read()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no codec"))?;
        codec.encode(url, payload)
    }

    fn settings(&self) -> Option<Arc<TransportSettings>> {
        self.settings.read().clone()
    }

    fn has_codec(&self) -> bool {
        self.codec.read().is_some()
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

/// Rejects every dependency it is offered.
#[derive(Default)]
pub struct PickyTransport {
    settings: RwLock<Option<Arc<TransportSettings>>>,
}

impl Extension for PickyTransport {
    fn inject(&self, injector: &Injector<'_>) {
        injector.inject("codec", |_codec: Arc<dyn Codec>| {
            Err(anyhow::anyhow!("codec rejected"))
        });
        injector.inject_object("settings", |settings: Arc<TransportSettings>| {
            *self.settings.write() = Some(settings);
            Ok(())
        });
    }
}

impl Transport for PickyTransport {
    fn send(&self, _url: &Url, payload: &str) -> anyhow::Result<String> {
        Ok(payload.to_string())
    }

    fn settings(&self) -> Option<Arc<TransportSettings>> {
        self.settings.read().clone()
    }

    fn has_codec(&self) -> bool {
        false
    }

    fn initialized(&self) -> bool {
        true
    }
}

pub struct FailingTransport;

impl Extension for FailingTransport {
    fn initialize(&self) -> anyhow::Result<()> {
        anyhow::bail!("port already bound")
    }
}

impl Transport for FailingTransport {
    fn send(&self, _url: &Url, _payload: &str) -> anyhow::Result<String> {
        anyhow::bail!("not started")
    }

    fn settings(&self) -> Option<Arc<TransportSettings>> {
        None
    }

    fn has_codec(&self) -> bool {
        false
    }

    fn initialized(&self) -> bool {
        false
    }
}

pub const TRANSPORT_DECLARATIONS: &str = "\
tcp=test.TcpTransport
picky=test.PickyTransport
failing=test.FailingTransport
panicking=test.PanickingTransport
";

// ============================================================================
// Filter: activation by group and key
// ============================================================================

pub trait Filter: Extension {
    fn id(&self) -> &'static str;
}

impl ExtensionPoint for dyn Filter {
    const NAME: &'static str = "neomind.rpc.Filter";
}

pub struct NamedFilter(pub &'static str);

impl Extension for NamedFilter {}

impl Filter for NamedFilter {
    fn id(&self) -> &'static str {
        self.0
    }
}

fn filter(class: &'static str, id: &'static str) -> Implementation<dyn Filter> {
    Implementation::regular(class, move || Arc::new(NamedFilter(id)) as Arc<dyn Filter>)
}

pub const FILTER_DECLARATIONS: &str = "\
echo=test.EchoFilter
monitor=test.MonitorFilter
token=test.TokenFilter
validation=test.ValidationFilter
cache=test.CacheFilter
plain=test.PlainFilter
";

pub fn ids(filters: &[Arc<dyn Filter>]) -> Vec<&'static str> {
    filters.iter().map(|f| f.id()).collect()
}

// ============================================================================
// System builders
// ============================================================================

/// A builder knowing every fixture implementation, without declarations.
pub fn catalog() -> ExtensionSystemBuilder {
    ExtensionSystem::builder()
        .implementation(Implementation::<dyn Protocol>::regular("test.HttpProtocol", http))
        .implementation(Implementation::<dyn Protocol>::regular("test.GrpcProtocol", grpc))
        .implementation(Implementation::<dyn Protocol>::without_constructor("test.ArgsProtocol"))
        .implementation(
            Implementation::<dyn Protocol>::wrapper("test.OuterWrapper", wrapper("outer"))
                .with_priority(1),
        )
        .implementation(
            Implementation::<dyn Protocol>::wrapper("test.InnerWrapper", wrapper("inner"))
                .with_priority(2),
        )
        .implementation(
            Implementation::<dyn Protocol>::wrapper("test.GrpcOnlyWrapper", wrapper("grpc-only"))
                .with_matches(&["grpc"]),
        )
        .implementation(Implementation::<dyn Protocol>::wrapper("test.CodecWrapper", codec_wrapper))
        .implementation(Implementation::<dyn Codec>::regular("test.JsonCodec", || {
            Arc::new(JsonCodec) as Arc<dyn Codec>
        }))
        .implementation(Implementation::<dyn Codec>::regular("test.TextCodec", || {
            Arc::new(TextCodec) as Arc<dyn Codec>
        }))
        .implementation(Implementation::<dyn Codec>::adaptive("test.FixedCodec", || {
            Arc::new(FixedCodec) as Arc<dyn Codec>
        }))
        .implementation(Implementation::<dyn Codec>::adaptive("test.OtherFixedCodec", || {
            Arc::new(FixedCodec) as Arc<dyn Codec>
        }))
        .implementation(Implementation::<dyn Transport>::regular("test.TcpTransport", || {
            Arc::new(TcpTransport::default()) as Arc<dyn Transport>
        }))
        .implementation(Implementation::<dyn Transport>::regular("test.PickyTransport", || {
            Arc::new(PickyTransport::default()) as Arc<dyn Transport>
        }))
        .implementation(Implementation::<dyn Transport>::regular("test.FailingTransport", || {
            Arc::new(FailingTransport) as Arc<dyn Transport>
        }))
        .implementation(Implementation::<dyn Transport>::regular("test.PanickingTransport", || {
            panic!("socket unavailable")
        }))
        .implementation(
            filter("test.EchoFilter", "echo").with_activation(Activation::new().with_order(1)),
        )
        .implementation(filter("test.MonitorFilter", "monitor").with_activation(
            Activation::new().with_groups(&["consumer"]).with_order(5),
        ))
        .implementation(filter("test.TokenFilter", "token").with_activation(
            Activation::new().with_groups(&["provider"]).with_order(1),
        ))
        .implementation(
            filter("test.ValidationFilter", "validation").with_activation(
                Activation::new()
                    .with_groups(&["provider", "consumer"])
                    .with_keys(&["validation"])
                    .with_order(10),
            ),
        )
        .implementation(
            filter("test.CacheFilter", "cache").with_activation(
                Activation::new()
                    .with_groups(&["consumer"])
                    .with_keys(&["cache:lru"])
                    .with_order(0),
            ),
        )
        .implementation(filter("test.PlainFilter", "plain"))
}

/// The fixture catalog with the standard declarations bundled.
pub fn standard() -> ExtensionSystemBuilder {
    catalog()
        .bundled(spi_path::<dyn Protocol>(), PROTOCOL_DECLARATIONS)
        .bundled(spi_path::<dyn Codec>(), CODEC_DECLARATIONS)
        .bundled(spi_path::<dyn Transport>(), TRANSPORT_DECLARATIONS)
        .bundled(spi_path::<dyn Filter>(), FILTER_DECLARATIONS)
}

pub fn standard_system() -> ExtensionSystem {
    init_logging();
    standard().build()
}

/// Resource path of `T` under the standard `spi/` directory.
pub fn spi_path<T: ExtensionPoint + ?Sized>() -> String {
    format!("{}{}", directories::STANDARD, T::NAME)
}

/// Resource path of `T` under the internal directory.
pub fn internal_path<T: ExtensionPoint + ?Sized>() -> String {
    format!("{}{}", directories::INTERNAL, T::NAME)
}

// Debug for the fixture trait objects so `Result<Arc<dyn _>, _>::unwrap_err` compiles.
impl std::fmt::Debug for dyn Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Protocol")
    }
}

impl std::fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Codec")
    }
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Transport")
    }
}

impl std::fmt::Debug for dyn Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Filter")
    }
}
