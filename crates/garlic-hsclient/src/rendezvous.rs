//! ESTABLISH_RENDEZVOUS / RENDEZVOUS_ESTABLISHED / RENDEZVOUS2 handling.

use crate::introduce::COOKIE_LEN;
use crate::{Error, Result};
use garlic_cell::relaycell::RelayCmd;
use garlic_hscrypto::hs_ntor::{ClientState, KeySeed};
use garlic_proto::circuit::TlsCircuit;
use rand_core::{CryptoRng, RngCore};

/// Send ESTABLISH_RENDEZVOUS with a fresh random cookie and await
/// RENDEZVOUS_ESTABLISHED, returning the cookie to embed in INTRODUCE1.
pub async fn establish_rendezvous<R: RngCore + CryptoRng>(client_circ: &mut TlsCircuit, rng: &mut R) -> Result<[u8; COOKIE_LEN]> {
    let mut cookie = [0u8; COOKIE_LEN];
    rng.fill_bytes(&mut cookie);
    client_circ.send_control(RelayCmd::ESTABLISH_RENDEZVOUS, cookie.to_vec()).await?;
    let reply = client_circ.recv_control().await?;
    if reply.cmd != RelayCmd::RENDEZVOUS_ESTABLISHED {
        return Err(Error::Protocol("expected RENDEZVOUS_ESTABLISHED in response to ESTABLISH_RENDEZVOUS"));
    }
    Ok(cookie)
}

/// Await RENDEZVOUS2 on the client circuit and complete the HS ntor
/// handshake, returning the key seed for the rendezvous hop.
pub async fn await_rendezvous2(client_circ: &mut TlsCircuit, client_state: &ClientState) -> Result<KeySeed> {
    let msg = client_circ.recv_control().await?;
    if msg.cmd != RelayCmd::RENDEZVOUS2 {
        return Err(Error::Protocol("expected RENDEZVOUS2 on the client circuit"));
    }
    Ok(client_state.receive_rendezvous(&msg.data)?)
}
