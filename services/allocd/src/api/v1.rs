//! Allocation RPCs.
//!
//! Each POST mirrors one allocator call verbatim; the blocking call runs on
//! tokio's blocking pool so no runtime worker ever waits on a table lock.

use std::net::Ipv4Addr;

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use containerops_alloc::{AllocError, Allocation};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/networks/{network}/ip", post(allocate_ip).get(list_ips))
        .route(
            "/networks/{network}/machines/{machine}/port",
            post(allocate_port).get(list_ports),
        )
}

fn default_present() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AllocateIpRequest {
    pub hostname: String,
    pub cidr: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default = "default_present")]
    pub present: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateIpResponse {
    pub ip: Option<Ipv4Addr>,
}

#[derive(Debug, Deserialize)]
pub struct AllocatePortRequest {
    pub hostname: String,
    pub port_range: (u16, u16),
    #[serde(default = "default_present")]
    pub present: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocatePortResponse {
    pub port: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryResponse<V> {
    pub key: String,
    pub value: V,
    pub allocated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<V> {
    pub items: Vec<EntryResponse<V>>,
}

impl<V> From<Vec<(String, Allocation<V>)>> for ListResponse<V> {
    fn from(entries: Vec<(String, Allocation<V>)>) -> Self {
        let items = entries
            .into_iter()
            .map(|(key, a)| EntryResponse {
                key,
                value: a.value,
                allocated_at: a.allocated_at,
            })
            .collect();
        Self { items }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, AllocError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal("internal_error", e.to_string()))?
        .map_err(ApiError::from)
}

async fn allocate_ip(
    State(state): State<AppState>,
    Path(network): Path<String>,
    Json(req): Json<AllocateIpRequest>,
) -> Result<Json<AllocateIpResponse>, ApiError> {
    let ipam = state.ipam().clone();
    let ip = blocking(move || {
        ipam.allocate(
            &network,
            &req.hostname,
            &req.cidr,
            req.ip.as_deref(),
            req.present,
        )
    })
    .await?;
    Ok(Json(AllocateIpResponse { ip }))
}

async fn list_ips(
    State(state): State<AppState>,
    Path(network): Path<String>,
) -> Result<Json<ListResponse<Ipv4Addr>>, ApiError> {
    let ipam = state.ipam().clone();
    let entries = blocking(move || ipam.list(&network)).await?;
    Ok(Json(entries.into()))
}

async fn allocate_port(
    State(state): State<AppState>,
    Path((network, machine)): Path<(String, String)>,
    Json(req): Json<AllocatePortRequest>,
) -> Result<Json<AllocatePortResponse>, ApiError> {
    let ports = state.ports().clone();
    let port = blocking(move || {
        ports.allocate(
            &network,
            &machine,
            &req.hostname,
            req.port_range,
            req.present,
        )
    })
    .await?;
    Ok(Json(AllocatePortResponse { port }))
}

async fn list_ports(
    State(state): State<AppState>,
    Path((network, machine)): Path<(String, String)>,
) -> Result<Json<ListResponse<u16>>, ApiError> {
    let ports = state.ports().clone();
    let entries = blocking(move || ports.list(&network, &machine)).await?;
    Ok(Json(entries.into()))
}
