// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The REST/JSON interface.
//!
//! [`router`] builds an [`axum`] router over an [`AppState`]. Every
//! request first passes through a middleware that applies the
//! [`authz`] filter using the client's address, which the server must
//! supply as [`ConnectInfo<SocketAddr>`]. Denied requests never reach
//! a handler. The middleware also logs each request and marks every
//! response as JSON.
//!
//! | Path                                | GET | POST | PUT | DELETE |
//! |-------------------------------------|-----|------|-----|--------|
//! | `/`                                 | 200 |      |     |        |
//! | `/:zone`                            | 200 | 405  | 405 | 405    |
//! | `/:zone/:host`                      | 200 | 206  | 200 | 204    |
//! | `/:zone/:host/ipaddress`            | 200 |      |     |        |
//! | `/:zone/:host/ipaddress/:ipaddress` | 200 | 206  | 204 | 204    |
//! | `/:zone/:host/cname`                | 200 |      |     |        |
//! | `/:zone/:host/cname/:cname`         | 200 | 206  | 405 | 204    |
//!
//! Every path may also be given with a trailing slash. Errors are
//! answered with a body of the form `{"error": "..."}`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use log::{error, info, warn};
use serde_json::json;

use crate::authz;
use crate::directory::Directory;
use crate::error::Error;
use crate::manager::Manager;
use crate::policy::Policy;

mod body;
mod handlers;

pub use body::RequestBody;

/// The [`Manager`] type served over HTTP.
pub type DynManager = Manager<Box<dyn Directory + Send>>;

////////////////////////////////////////////////////////////////////////
// APPLICATION STATE                                                  //
////////////////////////////////////////////////////////////////////////

/// The state shared by all requests: the [`Manager`], with its single
/// directory connection, and the policy used for authorization.
#[derive(Clone)]
pub struct AppState {
    manager: Arc<Mutex<DynManager>>,
    policy: Arc<Policy>,
}

impl AppState {
    pub fn new(manager: DynManager) -> Self {
        let policy = Arc::clone(manager.policy());
        Self {
            manager: Arc::new(Mutex::new(manager)),
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Runs `chain` against the [`Manager`] on tokio's blocking thread
    /// pool. Directory round trips are synchronous, and requests take
    /// turns with the manager, so one chain runs at a time.
    pub async fn run<T, F>(&self, chain: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut DynManager) -> Result<T, Error> + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        tokio::task::spawn_blocking(move || {
            // A panic in an earlier chain leaves the manager usable: the
            // directory holds the state, not the manager.
            let mut manager = manager.lock().unwrap_or_else(PoisonError::into_inner);
            chain(&mut manager)
        })
        .await
        .map_err(|e| Error::Database(format!("request task failed: {}", e)))?
    }
}

////////////////////////////////////////////////////////////////////////
// ROUTER                                                             //
////////////////////////////////////////////////////////////////////////

/// Builds the router serving the REST interface.
pub fn router(state: AppState) -> Router {
    use handlers::*;

    let mut router: Router<AppState> =
        Router::new().route("/", get(list_zones).fallback(zone_list_unsupported));
    let routes: [(&str, MethodRouter<AppState>); 6] = [
        ("/:zone", get(list_hosts).fallback(zone_unsupported)),
        (
            "/:zone/:host",
            get(get_host)
                .post(create_host)
                .put(change_ttl)
                .delete(delete_host)
                .fallback(host_unsupported),
        ),
        (
            "/:zone/:host/ipaddress",
            get(list_addresses).fallback(ipaddress_unsupported),
        ),
        (
            "/:zone/:host/ipaddress/:ipaddress",
            get(get_address)
                .post(add_address)
                .put(update_address)
                .delete(delete_address)
                .fallback(ipaddress_unsupported),
        ),
        ("/:zone/:host/cname", get(list_cnames).fallback(cname_unsupported)),
        (
            "/:zone/:host/cname/:cname",
            get(get_cname)
                .post(add_cname)
                .delete(delete_cname)
                .fallback(cname_unsupported),
        ),
    ];
    for (path, methods) in routes {
        router = router
            .route(&format!("{}/", path), methods.clone())
            .route(path, methods);
    }

    router
        .fallback(no_such_resource)
        .layer(middleware::from_fn_with_state(state.clone(), filter))
        .with_state(state)
}

/// Authorizes, logs, and labels every request.
async fn filter(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let source = peer.ip();

    let mut response = match authz::authorize(state.policy(), &path, source) {
        Ok(_) => next.run(request).await,
        Err(denial) => {
            warn!("Refused {} {} from {}: {}", method, path, source, denial);
            Error::from(denial).into_response()
        }
    };
    response
        .headers_mut()
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));
    info!(
        "{} {} from {}: {}",
        method,
        path,
        source,
        response.status().as_u16()
    );
    response
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotAllowed(_) => StatusCode::FORBIDDEN,
            Self::Database(_) => {
                error!("{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
