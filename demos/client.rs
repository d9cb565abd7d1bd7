//! Sends a handful of A-REQ packets to the `server` demo and prints
//! whatever comes back. Run `server` first, then this, both from the
//! repository root: `cargo run --bin server` / `cargo run --bin client`.

use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use fastpass::{AreqEntry, EngineCallbacks, EngineConfig, FastpassEngine, PktDesc, UdpTransport};

struct PrintCallbacks;

impl EngineCallbacks for PrintCallbacks {
    fn handle_ack(&mut self, pd: PktDesc) {
        println!(">>> acked seqno {}", pd.seqno);
    }

    fn handle_neg_ack(&mut self, pd: PktDesc) {
        println!(">>> lost seqno {}, would resubmit {} areq entries", pd.seqno, pd.areq.len());
    }

    fn handle_reset(&mut self) {
        println!(">>> reset epoch changed");
    }

    fn handle_alloc(&mut self, base_tslot: u16, dsts: &[u16], _slot_bytes: &[u8]) {
        println!(">>> alloc starting at tslot {base_tslot} for {} destinations", dsts.len());
    }
}

fn main() {
    env_logger::init();

    let bind_addr: SocketAddr = "127.0.0.1:9091".parse().unwrap();
    let peer_addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
    let transport = UdpTransport::connect(bind_addr, peer_addr).expect("bind/connect UDP socket");

    let config = EngineConfig::new(Ipv4Addr::new(127, 0, 0, 1), 9090);
    let engine = FastpassEngine::new(config, Ipv4Addr::new(127, 0, 0, 1), transport, Box::new(PrintCallbacks));

    println!(">>> sending 5 A-REQ packets to {peer_addr}");
    for i in 0..5u16 {
        let pd = PktDesc::new(vec![AreqEntry { src_dst_key: i, tslots: 1 }]);
        if let Err(e) = engine.send(pd) {
            eprintln!(">>> send failed: {e}");
        }
        thread::sleep(Duration::from_millis(200));
    }

    thread::sleep(Duration::from_secs(1));
    println!(">>> stats: {:?}", engine.stats());
    engine.shutdown();
}
