// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-process demo: runs both Host and Guest over one owned region,
// exercises listen/connect/accept, a request/response round trip, a
// keepalive, then disconnect. Real deployments run Host and Guest in
// separate VMs over a real ivshmem BAR2 mapping (see `pci.rs`); here
// both sides share one `RegionHandle::new_owned` buffer to demonstrate
// the protocol without a second VM.

use std::time::Duration;

use clap::Parser;
use ivshm_msg::endpoint::Endpoint;
use ivshm_msg::port::Role;
use ivshm_msg::region::RegionHandle;

const NAMESPACE_DEMO: u8 = ivshm_msg::namespace::NS_NET;

#[derive(Debug, Parser)]
#[command(name = "demo_handshake", about = "Host/Guest handshake and request/response demo")]
struct Args {
    /// Record capacity per ring.
    #[arg(long, default_value_t = 32)]
    ring_capacity: u32,

    /// Total mapped region size in bytes.
    #[arg(long, default_value_t = 256 * 1024)]
    region_size: usize,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let backing = RegionHandle::new_owned(args.region_size, args.ring_capacity)
        .expect("region_size too small for ring_capacity");
    let base = backing.base_ptr();
    let len = backing.len();
    let capacity = backing.layout().ring_capacity;

    // Both roles map the same bytes; this is only valid because this is
    // a single-process demo sharing one owned buffer, kept alive in
    // `backing` for the rest of `main`. Real peers each get their own
    // `RegionHandle::from_raw` over the same physical pages, mapped by
    // the platform.
    let host_region = unsafe { RegionHandle::from_raw(base, len, capacity).unwrap() };
    let guest_region = unsafe { RegionHandle::from_raw(base, len, capacity).unwrap() };

    let host = Endpoint::attach(host_region, Role::Host, 1, 2).expect("attach host");
    let guest = Endpoint::attach(guest_region, Role::Guest, 2, 1).expect("attach guest");

    // The Host side owns the arena and is the one that can carve a
    // per-socket sub-buffer out of it, so it is the Host that listens
    // and accepts; the Guest initiates with `connect`.
    let host_socket = host.create_socket(NAMESPACE_DEMO, "demo").expect("create host socket");
    host.listen(host_socket).expect("listen");

    let guest_socket = guest.create_socket(NAMESPACE_DEMO, "demo").expect("create guest socket");
    guest.listen(guest_socket).expect("listen");
    guest.connect(guest_socket).expect("connect");

    // Give the pollers a moment to run the conn -> accept -> ack exchange.
    std::thread::sleep(Duration::from_millis(50));

    tracing::info!(
        host_state = ?host.socket_state(host_socket),
        guest_state = ?guest.socket_state(guest_socket),
        "handshake settled"
    );

    match guest.keepalive(guest_socket) {
        Ok(()) => tracing::info!("keepalive acked"),
        Err(err) => tracing::warn!(?err, "keepalive failed"),
    }

    host.detach();
    guest.detach();
}
