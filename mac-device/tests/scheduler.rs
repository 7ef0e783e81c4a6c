//! End-to-end scheduler tests: a deterministic fake `Radio`/`System` pair
//! drives `Mac` through join and data requests.

use mac_device::event::Event;
use mac_device::mac::Mac;
use mac_device::radio::{Radio, RxMeta, RxSettings, TxSettings};
use mac_device::region::{Configuration, RegionId};
use mac_device::security::DefaultSecurityModule;
use mac_device::session::Session;
use mac_device::system::{Identity, System};
use mac_encoding::keys::AES128;

const TPS: u32 = 1_000_000;

struct FakeRadio {
    last_tx: heapless::Vec<u8, 255>,
    queued_rx: Option<heapless::Vec<u8, 255>>,
}

impl FakeRadio {
    fn new() -> Self {
        Self { last_tx: heapless::Vec::new(), queued_rx: None }
    }
}

impl Radio for FakeRadio {
    fn reset(&mut self, _hold: bool) {}
    fn sleep(&mut self) {}
    fn clear_interrupt(&mut self) {}
    fn entropy_begin(&mut self) {}
    fn entropy_end(&mut self) -> u32 {
        0xC0FFEE
    }
    fn transmit(&mut self, _settings: TxSettings, payload: &[u8]) {
        self.last_tx.clear();
        let _ = self.last_tx.extend_from_slice(payload);
    }
    fn receive(&mut self, _settings: RxSettings) {}
    fn collect(&mut self, meta: &mut RxMeta, out: &mut [u8]) -> usize {
        *meta = RxMeta { rssi: -80, snr: 5, freq: 0 };
        match self.queued_rx.take() {
            Some(frame) => {
                out[..frame.len()].copy_from_slice(&frame);
                frame.len()
            }
            None => 0,
        }
    }
    fn min_snr(&self, _spreading_factor: lora_modulation::SpreadingFactor) -> i8 {
        -20
    }
}

struct FakeSystem {
    ticks: u32,
    rand_stream: u8,
    identity: Identity,
    saved: Option<Session>,
}

impl FakeSystem {
    fn new() -> Self {
        Self {
            ticks: 0,
            rand_stream: 1,
            identity: Identity { dev_eui: [1; 8], join_eui: [2; 8] },
            saved: None,
        }
    }

    fn advance(&mut self, ticks: u32) {
        self.ticks = self.ticks.wrapping_add(ticks);
    }
}

impl System for FakeSystem {
    fn ticks(&self) -> u32 {
        self.ticks
    }
    fn tps(&self) -> u32 {
        TPS
    }
    fn eps(&self) -> u32 {
        0
    }
    fn rand(&mut self) -> u8 {
        self.rand_stream = self.rand_stream.wrapping_add(37);
        self.rand_stream
    }
    fn battery_level(&self) -> u8 {
        255
    }
    fn advance(&self) -> u32 {
        0
    }
    fn identity(&self) -> Identity {
        self.identity
    }
    fn restore_session(&self) -> Option<Session> {
        self.saved.clone()
    }
    fn save_session(&mut self, session: &Session) {
        self.saved = Some(session.clone());
    }
}

fn boot(mac: &mut Mac<DefaultSecurityModule>, radio: &mut FakeRadio, system: &mut FakeSystem) {
    // Init -> Entropy -> Idle; two process() calls with no time advance.
    assert!(matches!(mac.process(radio, system), None));
    let ev = mac.process(radio, system);
    assert!(matches!(ev, Some(Event::Startup { .. })));
}

#[test]
fn startup_reaches_idle_and_accepts_a_join_request() {
    let config = Configuration::new(RegionId::EU868);
    let security = DefaultSecurityModule::new(AES128([0x42; 16]), AES128([0x24; 16]));
    let mut mac = Mac::new(config, Identity { dev_eui: [1; 8], join_eui: [2; 8] }, security, 0);
    let mut radio = FakeRadio::new();
    let mut system = FakeSystem::new();

    boot(&mut mac, &mut radio, &mut system);
    assert!(mac.otaa().is_ok());

    // Idle -> channel picked -> Tx (builds and "transmits" a JoinRequest).
    assert!(mac.process(&mut radio, &mut system).is_none());
    assert_eq!(radio.last_tx.len(), 23);
    assert_eq!(radio.last_tx[0], 0x00); // MHDR: JoinRequest.

    // A second call to otaa() while mid-flight is rejected.
    assert!(mac.otaa().is_err());
}

#[test]
fn duplicate_requests_while_busy_are_rejected() {
    let config = Configuration::new(RegionId::EU868);
    let security = DefaultSecurityModule::new(AES128([0x11; 16]), AES128([0x22; 16]));
    let mut mac = Mac::new(config, Identity { dev_eui: [3; 8], join_eui: [4; 8] }, security, 0);
    let mut radio = FakeRadio::new();
    let mut system = FakeSystem::new();

    boot(&mut mac, &mut radio, &mut system);

    // Not joined yet: unconfirmed/confirmed both fail.
    assert!(mac.unconfirmed(1, b"hi").is_err());
    assert!(mac.confirmed(1, b"hi").is_err());

    assert!(mac.otaa().is_ok());
    // A data request can't be queued while the join is in flight.
    assert!(mac.unconfirmed(1, b"hi").is_err());

    system.advance(TPS);
    let _ = mac.process(&mut radio, &mut system);
}

#[test]
fn mtu_shrinks_with_lower_data_rates() {
    let config = Configuration::new(RegionId::EU868);
    let security = DefaultSecurityModule::new(AES128([0x55; 16]), AES128([0x66; 16]));
    let mac = Mac::new(config, Identity { dev_eui: [5; 8], join_eui: [6; 8] }, security, 0);
    // DR0 (SF12) caps at 59 bytes of MACPayload; minus FHDR (7) and FPort (1).
    assert_eq!(mac.mtu(), 51);
}
