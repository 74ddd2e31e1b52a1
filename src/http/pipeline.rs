//! Request pipeline plan and assembly.
//!
//! # Responsibilities
//! - Describe the ordered stages as data ([`PipelinePlan`])
//! - Validate the plan before anything binds
//! - Turn a valid plan into one axum [`Router`]
//!
//! # Design Decisions
//! - Stages are applied innermost first: route dispatch is the base router,
//!   then stages 11 down to 1 wrap it, then the error responder wraps
//!   everything, so it observes failures from every stage
//! - A stage that short-circuits returns its response straight to the
//!   error responder, skipping every later stage
//! - Disabling is per-plan; only request logging is switched by run mode

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{StatusCode, Uri},
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use thiserror::Error;
use tower_http::{
    catch_panic::CatchPanicLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::RunMode;
use crate::http::error::ApiError;
use crate::http::middleware::{
    body::{decode_json_body, BodyLimit},
    cookies::extract_cookies,
    errors::{panic_response, respond_to_errors},
    static_files::serve_static,
    upload::{stage_uploads, UploadStaging},
};
use crate::http::server::AppState;
use crate::routing::{RouteTable, RoutingError};
use crate::security::{
    build_cors_layer, headers::set_security_headers, pollution::guard_parameter_pollution,
    rate_limit::rate_limit, sanitize::sanitize_operators, xss::scrub_xss, RateLimiter,
};

/// One unit of request processing, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    BodyDecoding,
    Cookies,
    RequestLogging,
    UploadStaging,
    OperatorSanitization,
    SecurityHeaders,
    XssScrubbing,
    Cors,
    RateLimit,
    ParameterPollution,
    StaticAssets,
    RouteDispatch,
    ErrorResponder,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::BodyDecoding,
        Stage::Cookies,
        Stage::RequestLogging,
        Stage::UploadStaging,
        Stage::OperatorSanitization,
        Stage::SecurityHeaders,
        Stage::XssScrubbing,
        Stage::Cors,
        Stage::RateLimit,
        Stage::ParameterPollution,
        Stage::StaticAssets,
        Stage::RouteDispatch,
        Stage::ErrorResponder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::BodyDecoding => "body_decoding",
            Stage::Cookies => "cookies",
            Stage::RequestLogging => "request_logging",
            Stage::UploadStaging => "upload_staging",
            Stage::OperatorSanitization => "operator_sanitization",
            Stage::SecurityHeaders => "security_headers",
            Stage::XssScrubbing => "xss_scrubbing",
            Stage::Cors => "cors",
            Stage::RateLimit => "rate_limit",
            Stage::ParameterPollution => "parameter_pollution",
            Stage::StaticAssets => "static_assets",
            Stage::RouteDispatch => "route_dispatch",
            Stage::ErrorResponder => "error_responder",
        }
    }

    /// Fixed 1-based position in the pipeline.
    pub fn position(&self) -> u8 {
        *self as u8 + 1
    }

    /// Whether the stage may answer without calling the next one.
    pub fn can_short_circuit(&self) -> bool {
        matches!(
            self,
            Stage::BodyDecoding
                | Stage::UploadStaging
                | Stage::OperatorSanitization
                | Stage::XssScrubbing
                | Stage::Cors
                | Stage::RateLimit
                | Stage::ParameterPollution
                | Stage::StaticAssets
                | Stage::RouteDispatch
        )
    }

    /// Stages a plan may not disable.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            Stage::BodyDecoding | Stage::RouteDispatch | Stage::ErrorResponder
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage's slot in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub stage: Stage,
    pub enabled: bool,
    /// Declared ability to answer without calling the next stage. Must match
    /// [`Stage::can_short_circuit`].
    pub short_circuits: bool,
}

impl StageDescriptor {
    pub fn new(stage: Stage, enabled: bool) -> Self {
        Self {
            stage,
            enabled,
            short_circuits: stage.can_short_circuit(),
        }
    }

    pub fn enabled(stage: Stage) -> Self {
        Self::new(stage, true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("stage `{0}` is missing from the pipeline")]
    Missing(Stage),

    #[error("stage `{0}` appears more than once")]
    Duplicate(Stage),

    #[error("stage `{later}` is placed before `{earlier}`")]
    OutOfOrder { earlier: Stage, later: Stage },

    #[error("stage `{0}` cannot be disabled")]
    Required(Stage),

    #[error("stage `{stage}` declares short_circuits = {declared}, which it does not honor")]
    ShortCircuit { stage: Stage, declared: bool },
}

/// Declarative, ordered list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    stages: Vec<StageDescriptor>,
}

impl PipelinePlan {
    /// Every stage in order; request logging only in verbose modes.
    pub fn standard(mode: RunMode) -> Self {
        let stages = Stage::ALL
            .into_iter()
            .map(|stage| {
                StageDescriptor::new(stage, stage != Stage::RequestLogging || mode.verbose_logging())
            })
            .collect();
        Self { stages }
    }

    /// Build a plan from explicit descriptors, validating it.
    pub fn from_descriptors(stages: Vec<StageDescriptor>) -> Result<Self, PlanError> {
        let plan = Self { stages };
        plan.validate()?;
        Ok(plan)
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.stages.iter().any(|d| d.stage == stage && d.enabled)
    }

    /// Names of the enabled stages, in order.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.stage.name())
            .collect()
    }

    /// Check every stage appears once, in order, with required stages on and
    /// short-circuit behavior declared truthfully.
    pub fn validate(&self) -> Result<(), PlanError> {
        for stage in Stage::ALL {
            match self.stages.iter().filter(|d| d.stage == stage).count() {
                0 => return Err(PlanError::Missing(stage)),
                1 => {}
                _ => return Err(PlanError::Duplicate(stage)),
            }
        }

        for pair in self.stages.windows(2) {
            if pair[0].stage > pair[1].stage {
                return Err(PlanError::OutOfOrder {
                    earlier: pair[1].stage,
                    later: pair[0].stage,
                });
            }
        }

        if let Some(d) = self.stages.iter().find(|d| d.stage.is_required() && !d.enabled) {
            return Err(PlanError::Required(d.stage));
        }

        if let Some(d) = self
            .stages
            .iter()
            .find(|d| d.short_circuits != d.stage.can_short_circuit())
        {
            return Err(PlanError::ShortCircuit {
                stage: d.stage,
                declared: d.short_circuits,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("failed to prepare upload directory {path}: {source}")]
    UploadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The ready-to-serve router plus handles the server needs.
pub struct AssembledPipeline {
    pub router: Router,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Build the router for `plan`, mounting `groups`.
pub async fn assemble(
    state: &AppState,
    plan: &PipelinePlan,
    groups: &RouteTable,
) -> Result<AssembledPipeline, AssembleError> {
    plan.validate()?;

    let http = &state.config.server.http;
    let body_limit = BodyLimit(http.body_limit_bytes);
    let rate_limiter = Arc::new(RateLimiter::from_config(&state.config.server.rate_limit));

    let staging = if plan.is_enabled(Stage::UploadStaging) {
        let staging = UploadStaging::prepare(&http.upload_dir, http.upload_limit_bytes)
            .await
            .map_err(|source| AssembleError::UploadDir {
                path: http.upload_dir.clone(),
                source,
            })?;
        Some(Arc::new(staging))
    } else {
        None
    };

    let mut router = groups
        .mount(state)?
        .fallback(route_not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(http.request_timeout_secs),
        ));

    for descriptor in plan.stages().iter().rev().filter(|d| d.enabled) {
        router = match descriptor.stage {
            // Base router and outermost wrapper, handled around this loop.
            Stage::RouteDispatch | Stage::ErrorResponder => router,
            Stage::StaticAssets => {
                router.layer(from_fn_with_state(ServeDir::new(&http.static_dir), serve_static))
            }
            Stage::ParameterPollution => {
                router.layer(from_fn_with_state(body_limit, guard_parameter_pollution))
            }
            Stage::RateLimit => router.layer(from_fn_with_state(Arc::clone(&rate_limiter), rate_limit)),
            Stage::Cors => router.layer(build_cors_layer(&http.cors_origins)),
            Stage::XssScrubbing => router.layer(from_fn(scrub_xss)),
            Stage::SecurityHeaders => router.layer(from_fn(set_security_headers)),
            Stage::OperatorSanitization => router.layer(from_fn(sanitize_operators)),
            Stage::UploadStaging => match &staging {
                Some(staging) => router.layer(from_fn_with_state(Arc::clone(staging), stage_uploads)),
                None => router,
            },
            Stage::RequestLogging => router.layer(TraceLayer::new_for_http()),
            Stage::Cookies => router.layer(from_fn(extract_cookies)),
            Stage::BodyDecoding => router.layer(from_fn_with_state(body_limit, decode_json_body)),
        };
    }

    let router = router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn(respond_to_errors));

    tracing::info!(stages = ?plan.enabled_names(), groups = groups.len(), "Pipeline assembled");

    Ok(AssembledPipeline {
        router,
        rate_limiter,
    })
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
