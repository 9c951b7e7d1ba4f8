// Authentication middleware for the subtitle service
//
// This module provides authentication middleware for the HTTP API.
// When enabled it requires an `Authorization: Bearer <token>` header matching the configured
// token. OPTIONS requests are always allowed to support CORS pre-flight requests.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    http::header,
    Error,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::{debug, info, warn};
use std::rc::Rc;

use crate::config::AuthConfig;

/// Middleware factory for authentication
#[derive(Clone)]
pub struct Authentication {
    config: Rc<AuthConfig>,
}

impl Authentication {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        if !self.config.enabled {
            info!("Authentication requirement is disabled via configuration");
        }
        ok(AuthenticationMiddleware {
            service,
            config: Rc::clone(&self.config),
        })
    }
}

/// Authentication middleware implementation
pub struct AuthenticationMiddleware<S> {
    service: S,
    config: Rc<AuthConfig>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if req.method() == actix_web::http::Method::OPTIONS {
            debug!("OPTIONS request - bypassing authentication check");
        } else if let Err(error) = authenticate(&req, &self.config) {
            return Box::pin(async move { Err(error) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

/// Authenticate a request by checking the Authorization header
fn authenticate(req: &ServiceRequest, config: &AuthConfig) -> Result<(), Error> {
    if !config.enabled {
        return Ok(());
    }

    let Some(auth_header) = req.headers().get(header::AUTHORIZATION) else {
        warn!("Missing Authorization header on {}", req.path());
        return Err(ErrorUnauthorized("Authorization header is required"));
    };

    let Ok(auth_str) = auth_header.to_str() else {
        warn!("Authorization header contains invalid characters");
        return Err(ErrorUnauthorized("Invalid Authorization header"));
    };

    match auth_str.strip_prefix("Bearer ") {
        Some(token) => validate_token(token.trim(), config),
        None => {
            warn!("Invalid Authorization header format, missing 'Bearer' prefix");
            Err(ErrorUnauthorized(
                "Invalid Authorization header format. Must be 'Bearer <token>'",
            ))
        }
    }
}

/// Compare the presented token with the configured one
fn validate_token(token: &str, config: &AuthConfig) -> Result<(), Error> {
    match &config.token {
        Some(expected) if constant_time_eq(expected.as_bytes(), token.as_bytes()) => Ok(()),
        Some(_) => {
            warn!("Rejected request with an invalid token");
            Err(ErrorUnauthorized("Invalid token"))
        }
        None => {
            warn!("Authorization is enabled but no API_TOKEN is configured");
            Err(ErrorUnauthorized("Invalid token"))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
