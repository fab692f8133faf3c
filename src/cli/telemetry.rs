//! Log output and optional OTLP trace export.
//!
//! Logs go to stdout, pretty or JSON. Spans are exported over gRPC only when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set; the exported resource identifies the
//! gatekeep build (version, commit) and, via `GATEKEEP_ENVIRONMENT`, the
//! deployment.

use anyhow::{anyhow, bail, Context, Result};
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::{str::FromStr, sync::OnceLock, time::Duration};
use tonic::{
    metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};
use ulid::Ulid;
use url::{Position, Url};

const SERVICE_NAME: &str = "gatekeep";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Targets that stay quiet whatever the verbosity. sqlx logs every statement
/// at info; the `db.query` spans already carry them.
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("sqlx", "warn"),
    ("redis", "warn"),
    ("reqwest", "warn"),
    ("hyper", "error"),
    ("hyper_util", "error"),
    ("h2", "error"),
    ("tonic", "error"),
    ("opentelemetry_sdk", "warn"),
];

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Where and how spans are exported.
#[derive(Debug)]
struct ExportConfig {
    endpoint: Url,
    headers: MetadataMap,
    instance_id: String,
    environment: Option<String>,
}

impl ExportConfig {
    fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `None` when no endpoint is configured.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty());
        let Some(endpoint) = endpoint else {
            return Ok(None);
        };
        if let Some(protocol) = lookup("OTEL_EXPORTER_OTLP_PROTOCOL") {
            if protocol != "grpc" {
                bail!("OTEL_EXPORTER_OTLP_PROTOCOL={protocol} is not supported, use grpc");
            }
        }

        Ok(Some(Self {
            endpoint: parse_endpoint(&endpoint)?,
            headers: lookup("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|raw| parse_headers(&raw))
                .transpose()?
                .unwrap_or_default(),
            instance_id: lookup("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|| Ulid::new().to_string()),
            environment: lookup("GATEKEEP_ENVIRONMENT").filter(|v| !v.trim().is_empty()),
        }))
    }

    /// Scheme, host and port only; tonic adds the gRPC path.
    fn origin(&self) -> &str {
        &self.endpoint[..Position::BeforePath]
    }

    fn resource_attributes(&self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", self.instance_id.clone()),
            KeyValue::new("vcs.ref.head.revision", crate::GIT_COMMIT_HASH),
        ];
        if let Some(environment) = &self.environment {
            attributes.push(KeyValue::new(
                "deployment.environment.name",
                environment.clone(),
            ));
        }
        attributes
    }
}

/// Accepts `host:port` as shorthand for `https://host:port`.
fn parse_endpoint(raw: &str) -> Result<Url> {
    let raw = raw.trim().trim_end_matches('/');
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&with_scheme).with_context(|| format!("invalid OTLP endpoint: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        bail!("invalid OTLP endpoint: {raw}");
    }
    Ok(url)
}

/// `key1=value1,key2=value2`, as in `OTEL_EXPORTER_OTLP_HEADERS`.
fn parse_headers(raw: &str) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::new();
    for pair in raw.split(',').filter(|pair| !pair.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed OTLP header: {}", pair.trim()))?;
        let key = key.trim().to_ascii_lowercase();
        let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
            .map_err(|err| anyhow!("invalid OTLP header name {key}: {err}"))?;
        let value: MetadataValue<Ascii> = value
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid OTLP header value for {key}: {err}"))?;
        metadata.insert(name, value);
    }
    Ok(metadata)
}

fn filter_directives(level: Level) -> Vec<String> {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec![
        format!("{SERVICE_NAME}={level}"),
        // The `http.request` spans.
        format!("tower_http={level}"),
    ];
    directives.extend(
        QUIET_TARGETS
            .iter()
            .map(|(target, level)| format!("{target}={level}")),
    );
    directives
}

fn tracer_provider(config: &ExportConfig) -> Result<SdkTracerProvider> {
    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.origin())
        .with_timeout(EXPORT_TIMEOUT)
        .with_metadata(config.headers.clone());

    if config.endpoint.scheme() == "https" {
        if let Some(host) = config.endpoint.host_str() {
            builder = builder.with_tls_config(
                ClientTlsConfig::new()
                    .domain_name(host.to_string())
                    .with_native_roots(),
            );
        }
    }

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(builder.build()?)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(config.resource_attributes())
                .build(),
        )
        .build())
}

fn install_tracer(config: &ExportConfig) -> Result<Tracer> {
    let provider = tracer_provider(config)?;
    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());
    Ok(provider.tracer(SERVICE_NAME))
}

/// Install the global subscriber.
///
/// gatekeep's own events and the HTTP spans follow `verbosity_level`
/// (`ERROR` when unset); dependencies stay at warn or error. `RUST_LOG` adds
/// directives on top.
///
/// # Errors
///
/// Returns an error if the OTLP settings are invalid or a subscriber is
/// already installed.
pub fn init(verbosity_level: Option<Level>, format: LogFormat) -> Result<()> {
    let level = verbosity_level.unwrap_or(Level::ERROR);

    let mut filter = EnvFilter::builder()
        .with_default_directive(Level::ERROR.into())
        .from_env_lossy();
    for directive in filter_directives(level) {
        filter = filter.add_directive(directive.parse()?);
    }

    let fmt_layer = match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .pretty()
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let otel_layer = match ExportConfig::from_env()? {
        Some(config) => {
            let tracer = install_tracer(&config)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush pending spans (noop if export was never enabled).
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = provider.shutdown();
    }
}
