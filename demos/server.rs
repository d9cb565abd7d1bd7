//! Passive counterpart to the `client` demo: binds a UDP socket and prints
//! every dispatched engine event. Exits after a fixed window since this is
//! a demo, not a long-running service.

use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use fastpass::{EngineCallbacks, EngineConfig, FastpassEngine, PktDesc, UdpTransport};

struct PrintCallbacks;

impl EngineCallbacks for PrintCallbacks {
    fn handle_ack(&mut self, pd: PktDesc) {
        println!(">>> acked seqno {}", pd.seqno);
    }

    fn handle_neg_ack(&mut self, pd: PktDesc) {
        println!(">>> lost seqno {}", pd.seqno);
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

    let bind_addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
    let peer_addr: SocketAddr = "127.0.0.1:9091".parse().unwrap();
    let transport = UdpTransport::connect(bind_addr, peer_addr).expect("bind/connect UDP socket");

    let config = EngineConfig::new(Ipv4Addr::new(127, 0, 0, 1), 9091);
    let engine = FastpassEngine::new(config, Ipv4Addr::new(127, 0, 0, 1), transport, Box::new(PrintCallbacks));

    println!(">>> listening on {bind_addr}, waiting for traffic from {peer_addr}");
    thread::sleep(Duration::from_secs(5));

    println!(">>> stats: {:?}", engine.stats());
    engine.shutdown();
}
