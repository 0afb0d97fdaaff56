//! Link-layer plumbing: raw datalink channels, Ethernet framing and
//! link-state monitoring.

use anyhow::{anyhow, Result};
use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, MacAddr, NetworkInterface};
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::vlan::VlanPacket;
use pnet::packet::Packet;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const ETHERNET_HDR_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

/// Notifications from the link layer and the wireless driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Up,
    Down,
    Associated { bssid: MacAddr, ssid: Option<String> },
    Disassociated,
    ScanComplete(Vec<MacAddr>),
    /// The driver finished the 4-way handshake with the current BSSID.
    HandshakeComplete,
}

pub struct LinkChannel {
    pub mac: MacAddr,
    pub tx: Box<dyn DataLinkSender>,
    pub rx: Box<dyn DataLinkReceiver>,
}

pub fn find_interface(name: &str) -> Option<NetworkInterface> {
    datalink::interfaces().into_iter().find(|iface| iface.name == name)
}

/// Opens the raw Ethernet channel for `name`.
pub fn open_channel(name: &str) -> Result<LinkChannel> {
    let interface = find_interface(name).ok_or_else(|| anyhow!("interface {} not found", name))?;
    let mac = interface
        .mac
        .ok_or_else(|| anyhow!("interface {} has no link-layer address", name))?;

    let mut channel_config = datalink::Config::default();
    channel_config.read_timeout = Some(Duration::from_millis(100));

    match datalink::channel(&interface, channel_config)? {
        Channel::Ethernet(tx, rx) => {
            info!("Opened datalink channel on {} ({})", name, mac);
            Ok(LinkChannel { mac, tx, rx })
        }
        _ => Err(anyhow!("unhandled datalink channel type on {}", name)),
    }
}

/// Drains `rx` on a blocking thread and forwards every frame to `frames`.
/// Stops once the receiving side of `frames` is dropped.
pub fn spawn_receiver(mut rx: Box<dyn DataLinkReceiver>, frames: mpsc::Sender<Vec<u8>>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || loop {
        match rx.next() {
            Ok(frame) => {
                if frames.blocking_send(frame.to_vec()).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                if frames.is_closed() {
                    return;
                }
            }
            Err(e) => {
                error!("An error occurred while reading from datalink channel: {}", e);
            }
        }
    })
}

/// Whether the kernel exposes wireless extensions for the interface.
pub fn is_wireless(name: &str) -> bool {
    Path::new("/sys/class/net").join(name).join("wireless").exists()
}

/// Polls the interface flags and reports up/down transitions.
pub async fn monitor_link(name: String, period: Duration, events: mpsc::Sender<LinkEvent>) {
    let mut interval = tokio::time::interval(period);
    let mut last: Option<bool> = None;
    loop {
        interval.tick().await;
        let up = match find_interface(&name) {
            Some(iface) => iface.is_up(),
            None => {
                warn!("Interface {} disappeared", name);
                false
            }
        };
        if last != Some(up) {
            debug!("Link on {} is {}", name, if up { "up" } else { "down" });
            let event = if up { LinkEvent::Up } else { LinkEvent::Down };
            if events.send(event).await.is_err() {
                return;
            }
            last = Some(up);
        }
    }
}

/// Addressing and payload of a received Ethernet frame, VLAN tag removed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct EthernetFrame<'a> {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ethertype: u16,
    pub payload: &'a [u8],
}

pub fn parse_ethernet(frame: &[u8]) -> Option<EthernetFrame<'_>> {
    let ethernet = EthernetPacket::new(frame)?;
    let destination = ethernet.get_destination();
    let source = ethernet.get_source();
    let outer = ethernet.get_ethertype();
    if outer == EtherTypes::Vlan {
        let vlan = VlanPacket::new(ethernet.payload())?;
        let offset = ETHERNET_HDR_LEN + VLAN_TAG_LEN;
        if frame.len() < offset {
            return None;
        }
        return Some(EthernetFrame {
            destination,
            source,
            ethertype: vlan.get_ethertype().0,
            payload: &frame[offset..],
        });
    }
    Some(EthernetFrame {
        destination,
        source,
        ethertype: outer.0,
        payload: &frame[ETHERNET_HDR_LEN..],
    })
}

pub fn build_ethernet(destination: MacAddr, source: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut eth_buf = vec![0u8; ETHERNET_HDR_LEN + payload.len()];
    // The buffer always holds a full header, so this never fails.
    if let Some(mut eth_packet) = MutableEthernetPacket::new(&mut eth_buf) {
        eth_packet.set_destination(destination);
        eth_packet.set_source(source);
        eth_packet.set_ethertype(EtherType(ethertype));
        eth_packet.set_payload(payload);
    }
    eth_buf
}
