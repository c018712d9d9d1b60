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

//! Handlers for the individual resources.
//!
//! Each handler parses its input, then runs its whole call chain
//! against the [`Manager`](crate::manager::Manager) in one
//! [`AppState::run`] invocation. Successful writes answer 206 (create)
//! or 204 (update and delete) with no body.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{Method, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use super::body::RequestBody;
use super::AppState;
use crate::error::Error;
use crate::manager::{parse_address, HostData};

type HostPath = Path<(String, String)>;
type ValuePath = Path<(String, String, String)>;

/// Returns whether the query string contains `replace=true`.
fn wants_replace(query: Option<&str>) -> bool {
    query.map_or(false, |q| q.split('&').any(|pair| pair == "replace=true"))
}

////////////////////////////////////////////////////////////////////////
// ZONES AND HOSTS                                                    //
////////////////////////////////////////////////////////////////////////

pub async fn list_zones(State(state): State<AppState>) -> Result<Json<Vec<String>>, Error> {
    state.run(|m| m.list_zones()).await.map(Json)
}

pub async fn list_hosts(
    State(state): State<AppState>,
    Path(zone): Path<String>,
) -> Result<Json<Vec<String>>, Error> {
    state.run(move |m| m.list_hosts(&zone)).await.map(Json)
}

pub async fn get_host(
    State(state): State<AppState>,
    Path((zone, host)): HostPath,
) -> Result<Json<HostData>, Error> {
    state.run(move |m| m.get_host(&zone, &host)).await.map(Json)
}

pub async fn create_host(
    State(state): State<AppState>,
    Path((zone, host)): HostPath,
    body: Bytes,
) -> Result<StatusCode, Error> {
    let body = RequestBody::parse(&body)?;
    state
        .run(move |m| m.create_host(&zone, &host, body.ttl))
        .await?;
    Ok(StatusCode::PARTIAL_CONTENT)
}

pub async fn change_ttl(
    State(state): State<AppState>,
    Path((zone, host)): HostPath,
    body: Bytes,
) -> Result<Json<HostData>, Error> {
    let ttl = RequestBody::parse(&body)?
        .ttl
        .ok_or_else(|| Error::InvalidInput("TTL value is mandatory".to_owned()))?;
    state
        .run(move |m| {
            m.change_ttl(&zone, &host, ttl)?;
            m.get_host(&zone, &host)
        })
        .await
        .map(Json)
}

pub async fn delete_host(
    State(state): State<AppState>,
    Path((zone, host)): HostPath,
) -> Result<StatusCode, Error> {
    state.run(move |m| m.delete_host(&zone, &host)).await?;
    Ok(StatusCode::NO_CONTENT)
}

////////////////////////////////////////////////////////////////////////
// ADDRESSES                                                          //
////////////////////////////////////////////////////////////////////////

fn lacks_address(host: &str, ip: &str) -> Error {
    Error::NotFound(format!("Host {} does not have ip {}", host, ip))
}

pub async fn list_addresses(
    State(state): State<AppState>,
    Path((zone, host)): HostPath,
) -> Result<Json<Vec<String>>, Error> {
    state
        .run(move |m| m.get_host(&zone, &host))
        .await
        .map(|data| Json(data.addresses))
}

/// Reports whether the host owns the address's PTR record.
pub async fn get_address(
    State(state): State<AppState>,
    Path((zone, host, ip)): ValuePath,
) -> Result<Json<Value>, Error> {
    state
        .run(move |m| {
            if !m.host_has_address(&zone, &host, &ip)? {
                return Err(lacks_address(&host, &ip));
            }
            let addr = parse_address(&ip)?;
            Ok(json!({ "reverse": m.owns_reverse(&zone, &host, addr) }))
        })
        .await
        .map(Json)
}

/// Adds an address, creating the host if necessary, and optionally
/// points the address's PTR record at the host.
pub async fn add_address(
    State(state): State<AppState>,
    Path((zone, host, ip)): ValuePath,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<StatusCode, Error> {
    let body = RequestBody::parse(&body)?;
    let replace = wants_replace(query.as_deref());
    let addr = parse_address(&ip)?;
    state
        .run(move |m| {
            m.ensure_host(&zone, &host, body.ttl)?;
            m.add_address(&zone, &host, &ip)?;
            if body.reverse {
                m.create_reverse(addr, &zone, &host, replace)?;
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::PARTIAL_CONTENT)
}

/// Creates or deletes the address's PTR record according to the body's
/// `reverse` field. Only a PTR record owned by the host is deleted.
pub async fn update_address(
    State(state): State<AppState>,
    Path((zone, host, ip)): ValuePath,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<StatusCode, Error> {
    let body = RequestBody::parse(&body)?;
    let replace = wants_replace(query.as_deref());
    state
        .run(move |m| {
            if !m.host_has_address(&zone, &host, &ip)? {
                return Err(lacks_address(&host, &ip));
            }
            let addr = parse_address(&ip)?;
            let owned = m.owns_reverse(&zone, &host, addr);
            if body.reverse && !owned {
                m.create_reverse(addr, &zone, &host, replace)
            } else if !body.reverse && owned {
                m.delete_reverse(&zone, addr)
            } else {
                Ok(())
            }
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_address(
    State(state): State<AppState>,
    Path((zone, host, ip)): ValuePath,
) -> Result<StatusCode, Error> {
    state
        .run(move |m| {
            if !m.host_has_address(&zone, &host, &ip)? {
                return Err(lacks_address(&host, &ip));
            }
            m.remove_address(&zone, &host, &ip)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

////////////////////////////////////////////////////////////////////////
// CNAMES                                                             //
////////////////////////////////////////////////////////////////////////

fn lacks_cname(host: &str, cname: &str) -> Error {
    Error::NotFound(format!("Host {} does not have cname {}", host, cname))
}

pub async fn list_cnames(
    State(state): State<AppState>,
    Path((zone, host)): HostPath,
) -> Result<Json<Vec<String>>, Error> {
    state
        .run(move |m| m.get_host(&zone, &host))
        .await
        .map(|data| Json(data.cnames))
}

pub async fn get_cname(
    State(state): State<AppState>,
    Path((zone, host, cname)): ValuePath,
) -> Result<Json<Value>, Error> {
    state
        .run(move |m| {
            if m.host_has_cname(&zone, &host, &cname)? {
                Ok(json!({}))
            } else {
                Err(lacks_cname(&host, &cname))
            }
        })
        .await
        .map(Json)
}

pub async fn add_cname(
    State(state): State<AppState>,
    Path((zone, host, cname)): ValuePath,
    body: Bytes,
) -> Result<StatusCode, Error> {
    let body = RequestBody::parse(&body)?;
    state
        .run(move |m| m.add_cname(&zone, &host, &cname, body.ttl))
        .await?;
    Ok(StatusCode::PARTIAL_CONTENT)
}

pub async fn delete_cname(
    State(state): State<AppState>,
    Path((zone, host, cname)): ValuePath,
) -> Result<StatusCode, Error> {
    state
        .run(move |m| {
            if !m.host_has_cname(&zone, &host, &cname)? {
                return Err(lacks_cname(&host, &cname));
            }
            m.remove_cname(&zone, &host, &cname)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

////////////////////////////////////////////////////////////////////////
// FALLBACKS                                                          //
////////////////////////////////////////////////////////////////////////

/// Answers 405 for a method a resource does not support.
fn unsupported(method: &Method, resource: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": format!("{} is not supported by {} resources", method, resource)
        })),
    )
}

pub async fn zone_list_unsupported(method: Method) -> (StatusCode, Json<Value>) {
    unsupported(&method, "zone list")
}

pub async fn zone_unsupported(method: Method) -> (StatusCode, Json<Value>) {
    unsupported(&method, "zone")
}

pub async fn host_unsupported(method: Method) -> (StatusCode, Json<Value>) {
    unsupported(&method, "host")
}

pub async fn ipaddress_unsupported(method: Method) -> (StatusCode, Json<Value>) {
    unsupported(&method, "ipaddress")
}

pub async fn cname_unsupported(method: Method) -> (StatusCode, Json<Value>) {
    unsupported(&method, "cname")
}

pub async fn no_such_resource() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "No such resource" })),
    )
}
