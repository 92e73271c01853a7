//! Orchestrates one rendezvous attempt across an already-built client
//! circuit (ending at the rendezvous point) and an already-built
//! introduction circuit (ending at the introduction point), running
//! all four protocol steps of the introduction/rendezvous handshake.
//!
//! Building the two circuits themselves (choosing routers, racing
//! several attempts against each other) is `garlic-circmgr`'s job; this
//! function only runs the wire protocol once both links exist.

use crate::introduce::build_introduce1_body;
use crate::rendezvous::{await_rendezvous2, establish_rendezvous};
use crate::{Error, Result};
use garlic_cell::relaycell::RelayCmd;
use garlic_hscrypto::hs_ntor::{ClientState, ServiceInfo};
use garlic_netdir::hsdesc_fetch::IntroductionPoint;
use garlic_proto::circuit::TlsCircuit;
use garlic_proto::hop::Hop;
use rand_core::{CryptoRng, RngCore};

/// Run the full rendezvous protocol to completion: establish the
/// rendezvous point, introduce, and push the resulting end-to-end hop
/// onto `client_circ`. On return, `client_circ`'s innermost hop talks
/// directly to the hidden service.
///
/// `rp_ntor_key` and `rp_link_specifiers` describe the rendezvous point
/// `client_circ` already ends at; they travel inside the encrypted
/// INTRODUCE1 payload so the service knows where to extend to meet us.
#[tracing::instrument(skip_all)]
pub async fn connect<R: RngCore + CryptoRng>(
    client_circ: &mut TlsCircuit,
    intro_circ: &mut TlsCircuit,
    intro: &IntroductionPoint,
    rp_ntor_key: [u8; 32],
    rp_link_specifiers: Vec<u8>,
    rng: &mut R,
) -> Result<()> {
    let cookie = establish_rendezvous(client_circ, rng).await?;

    let service = ServiceInfo {
        intro_ntor_key: x25519_dalek::PublicKey::from(intro.enc_key_ntor),
        auth_key: intro.auth_key,
        subcredential: intro.subcredential,
    };
    let client_state = ClientState::new(rng, service);
    let body = build_introduce1_body(&client_state, &intro.auth_key, &cookie, rp_ntor_key, rp_link_specifiers);
    intro_circ.send_control(RelayCmd::INTRODUCE1, body).await?;

    let ack = intro_circ.recv_control().await?;
    if ack.cmd != RelayCmd::INTRODUCE_ACK {
        return Err(Error::Protocol("expected INTRODUCE_ACK in response to INTRODUCE1"));
    }
    let status = ack.data.first().copied().unwrap_or(0xFF);
    if status != 0 {
        return Err(Error::Introduce(status));
    }

    let seed = await_rendezvous2(client_circ, &client_state).await?;
    client_circ.push_hop(Hop::from_hs_key_seed(&seed.expand(128)));
    Ok(())
}
