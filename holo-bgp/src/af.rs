//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use bytes::BytesMut;

use crate::debug::Debug;
use crate::packet::attribute::{
    self, Attr, Attrs, BaseAttrs, MpNexthop, MpReachNlri, MpUnreachNlri,
};
use crate::packet::consts::AfiSafi;
use crate::packet::message::{
    EncodeCxt, Message, ReachNlri, UnreachNlri, UpdateMsg,
};
use crate::packet::nlri::{Nlri, NlriEntry};

// Address-family specific behavior of the RIB.
//
// There's one implementation per family of AFI/SAFIs sharing the same next
// hop handling and UPDATE encoding. Logic common to all families lives in free
// functions taking a `&dyn RibSupport`.
pub trait RibSupport: Send + Sync {
    // AFI/SAFI handled by this instance.
    fn afi_safi(&self) -> AfiSafi;

    // Whether routes of this address family are unusable without a next hop.
    fn nexthop_required(&self) -> bool {
        true
    }

    // Extracts the next hop address from a received MP_REACH_NLRI attribute.
    fn nexthop_rx(&self, nexthop: &MpNexthop) -> Option<IpAddr> {
        nexthop.addr()
    }

    // Builds the MP_REACH_NLRI next hop for transmission.
    //
    // Returns `None` when the next hop can't be expressed in this address
    // family, in which case the routes aren't advertised.
    fn nexthop_tx(&self, attrs: &BaseAttrs) -> Option<MpNexthop>;

    // Builds BGP UPDATE messages based on the provided update queue, which is
    // left empty.
    fn build_updates(
        &self,
        queue: &mut UpdateQueue,
        cxt: &EncodeCxt,
    ) -> Vec<Message>;
}

// Routes pending transmission to a neighbor, for a single AFI/SAFI.
//
// Reachable routes are grouped by their attributes so that they can be packed
// into as few UPDATE messages as possible.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pub reach: BTreeMap<Attrs, BTreeSet<Nlri>>,
    pub unreach: BTreeSet<Nlri>,
}

#[derive(Debug)]
pub struct UnicastSupport(pub AfiSafi);

#[derive(Debug)]
pub struct LabeledUnicastSupport(pub AfiSafi);

#[derive(Debug)]
pub struct VpnSupport(pub AfiSafi);

#[derive(Debug)]
pub struct EvpnSupport;

#[derive(Debug)]
pub struct FlowspecSupport(pub AfiSafi);

#[derive(Debug)]
pub struct LinkStateSupport;

// ===== impl UpdateQueue =====

impl UpdateQueue {
    pub(crate) fn is_empty(&self) -> bool {
        self.reach.is_empty() && self.unreach.is_empty()
    }

    // Queues a route for advertisement, canceling any pending update for the
    // same destination.
    pub(crate) fn advertise(&mut self, nlri: Nlri, attrs: Attrs) {
        self.cancel(&nlri);
        self.reach.entry(attrs).or_default().insert(nlri);
    }

    // Queues a route for withdrawal, canceling any pending update for the
    // same destination.
    pub(crate) fn withdraw(&mut self, nlri: Nlri) {
        self.cancel(&nlri);
        self.unreach.insert(nlri);
    }

    fn cancel(&mut self, nlri: &Nlri) {
        self.unreach.remove(nlri);
        self.reach.retain(|_, nlris| {
            nlris.remove(nlri);
            !nlris.is_empty()
        });
    }
}

// ===== impl UnicastSupport =====

impl RibSupport for UnicastSupport {
    fn afi_safi(&self) -> AfiSafi {
        self.0
    }

    fn nexthop_tx(&self, attrs: &BaseAttrs) -> Option<MpNexthop> {
        match attrs.nexthop? {
            IpAddr::V4(addr) if self.0 == AfiSafi::Ipv4Unicast => {
                Some(MpNexthop::Ipv4(addr))
            }
            IpAddr::V4(addr) => Some(MpNexthop::Ipv6 {
                global: addr.to_ipv6_mapped(),
                link_local: None,
            }),
            IpAddr::V6(global) => Some(MpNexthop::Ipv6 {
                global,
                link_local: attrs.ll_nexthop,
            }),
        }
    }

    fn build_updates(
        &self,
        queue: &mut UpdateQueue,
        cxt: &EncodeCxt,
    ) -> Vec<Message> {
        // IPv4 unicast routes use the NLRI and withdrawn routes fields of the
        // UPDATE message.
        if self.0 == AfiSafi::Ipv4Unicast {
            return build_classic_updates(self, queue, cxt);
        }
        build_mp_updates(self, queue, cxt)
    }
}

// ===== impl LabeledUnicastSupport =====

impl RibSupport for LabeledUnicastSupport {
    fn afi_safi(&self) -> AfiSafi {
        self.0
    }

    fn nexthop_tx(&self, attrs: &BaseAttrs) -> Option<MpNexthop> {
        match (self.0, attrs.nexthop?) {
            (AfiSafi::Ipv4LabeledUnicast, IpAddr::V4(addr)) => {
                Some(MpNexthop::Ipv4(addr))
            }
            (_, IpAddr::V6(global)) => Some(MpNexthop::Ipv6 {
                global,
                link_local: attrs.ll_nexthop,
            }),
            (_, IpAddr::V4(addr)) => Some(MpNexthop::Ipv6 {
                global: addr.to_ipv6_mapped(),
                link_local: None,
            }),
        }
    }

    fn build_updates(
        &self,
        queue: &mut UpdateQueue,
        cxt: &EncodeCxt,
    ) -> Vec<Message> {
        build_mp_updates(self, queue, cxt)
    }
}

// ===== impl VpnSupport =====

impl RibSupport for VpnSupport {
    fn afi_safi(&self) -> AfiSafi {
        self.0
    }

    fn nexthop_tx(&self, attrs: &BaseAttrs) -> Option<MpNexthop> {
        match (self.0, attrs.nexthop?) {
            (AfiSafi::Ipv4Vpn, IpAddr::V4(addr)) => {
                Some(MpNexthop::VpnIpv4(addr))
            }
            (_, IpAddr::V6(global)) => Some(MpNexthop::VpnIpv6 {
                global,
                link_local: attrs.ll_nexthop,
            }),
            (_, IpAddr::V4(addr)) => Some(MpNexthop::VpnIpv6 {
                global: addr.to_ipv6_mapped(),
                link_local: None,
            }),
        }
    }

    fn build_updates(
        &self,
        queue: &mut UpdateQueue,
        cxt: &EncodeCxt,
    ) -> Vec<Message> {
        build_mp_updates(self, queue, cxt)
    }
}

// ===== impl EvpnSupport =====

impl RibSupport for EvpnSupport {
    fn afi_safi(&self) -> AfiSafi {
        AfiSafi::L2vpnEvpn
    }

    fn nexthop_tx(&self, attrs: &BaseAttrs) -> Option<MpNexthop> {
        let nexthop = match attrs.nexthop? {
            IpAddr::V4(addr) => MpNexthop::Ipv4(addr),
            IpAddr::V6(global) => MpNexthop::Ipv6 {
                global,
                link_local: None,
            },
        };
        Some(nexthop)
    }

    fn build_updates(
        &self,
        queue: &mut UpdateQueue,
        cxt: &EncodeCxt,
    ) -> Vec<Message> {
        build_mp_updates(self, queue, cxt)
    }
}

// ===== impl FlowspecSupport =====

impl RibSupport for FlowspecSupport {
    fn afi_safi(&self) -> AfiSafi {
        self.0
    }

    // Flow specification rules carry their actions in extended communities.
    fn nexthop_required(&self) -> bool {
        false
    }

    fn nexthop_rx(&self, _nexthop: &MpNexthop) -> Option<IpAddr> {
        None
    }

    fn nexthop_tx(&self, _attrs: &BaseAttrs) -> Option<MpNexthop> {
        Some(MpNexthop::None)
    }

    fn build_updates(
        &self,
        queue: &mut UpdateQueue,
        cxt: &EncodeCxt,
    ) -> Vec<Message> {
        build_mp_updates(self, queue, cxt)
    }
}

// ===== impl LinkStateSupport =====

impl RibSupport for LinkStateSupport {
    fn afi_safi(&self) -> AfiSafi {
        AfiSafi::LinkState
    }

    fn nexthop_required(&self) -> bool {
        false
    }

    fn nexthop_tx(&self, attrs: &BaseAttrs) -> Option<MpNexthop> {
        let nexthop = match attrs.nexthop {
            None => MpNexthop::None,
            Some(IpAddr::V4(addr)) => MpNexthop::Ipv4(addr),
            Some(IpAddr::V6(global)) => MpNexthop::Ipv6 {
                global,
                link_local: None,
            },
        };
        Some(nexthop)
    }

    fn build_updates(
        &self,
        queue: &mut UpdateQueue,
        cxt: &EncodeCxt,
    ) -> Vec<Message> {
        build_mp_updates(self, queue, cxt)
    }
}

// ===== global functions =====

// Returns the RIB support strategy of the given AFI/SAFI.
pub fn rib_support(afi_safi: AfiSafi) -> &'static dyn RibSupport {
    static IPV4_UNICAST: UnicastSupport = UnicastSupport(AfiSafi::Ipv4Unicast);
    static IPV6_UNICAST: UnicastSupport = UnicastSupport(AfiSafi::Ipv6Unicast);
    static IPV4_LABELED: LabeledUnicastSupport =
        LabeledUnicastSupport(AfiSafi::Ipv4LabeledUnicast);
    static IPV6_LABELED: LabeledUnicastSupport =
        LabeledUnicastSupport(AfiSafi::Ipv6LabeledUnicast);
    static IPV4_VPN: VpnSupport = VpnSupport(AfiSafi::Ipv4Vpn);
    static IPV6_VPN: VpnSupport = VpnSupport(AfiSafi::Ipv6Vpn);
    static EVPN: EvpnSupport = EvpnSupport;
    static IPV4_FLOWSPEC: FlowspecSupport =
        FlowspecSupport(AfiSafi::Ipv4Flowspec);
    static IPV6_FLOWSPEC: FlowspecSupport =
        FlowspecSupport(AfiSafi::Ipv6Flowspec);
    static IPV4_VPN_FLOWSPEC: FlowspecSupport =
        FlowspecSupport(AfiSafi::Ipv4VpnFlowspec);
    static IPV6_VPN_FLOWSPEC: FlowspecSupport =
        FlowspecSupport(AfiSafi::Ipv6VpnFlowspec);
    static LINK_STATE: LinkStateSupport = LinkStateSupport;

    match afi_safi {
        AfiSafi::Ipv4Unicast => &IPV4_UNICAST,
        AfiSafi::Ipv6Unicast => &IPV6_UNICAST,
        AfiSafi::Ipv4LabeledUnicast => &IPV4_LABELED,
        AfiSafi::Ipv6LabeledUnicast => &IPV6_LABELED,
        AfiSafi::Ipv4Vpn => &IPV4_VPN,
        AfiSafi::Ipv6Vpn => &IPV6_VPN,
        AfiSafi::L2vpnEvpn => &EVPN,
        AfiSafi::Ipv4Flowspec => &IPV4_FLOWSPEC,
        AfiSafi::Ipv6Flowspec => &IPV6_FLOWSPEC,
        AfiSafi::Ipv4VpnFlowspec => &IPV4_VPN_FLOWSPEC,
        AfiSafi::Ipv6VpnFlowspec => &IPV6_VPN_FLOWSPEC,
        AfiSafi::LinkState => &LINK_STATE,
    }
}

// Builds UPDATE messages carrying the routes in the MP_REACH_NLRI and
// MP_UNREACH_NLRI attributes.
pub fn build_mp_updates(
    support: &dyn RibSupport,
    queue: &mut UpdateQueue,
    cxt: &EncodeCxt,
) -> Vec<Message> {
    let afi_safi = support.afi_safi();
    let mut msgs = vec![];
    let reach = std::mem::take(&mut queue.reach);
    let mut unreach = std::mem::take(&mut queue.unreach);

    // Reachable routes.
    for (attrs, nlris) in reach {
        let Some(nexthop) = support.nexthop_tx(&attrs.base) else {
            continue;
        };
        let mp_header = encoded_attr_len(
            &Attr::MpReach(MpReachNlri {
                afi_safi,
                nexthop,
                nlri: vec![],
            }),
            cxt,
        );
        let Some(budget) = nlri_budget(attrs.length(cxt) + mp_header) else {
            Debug::UpdateAttrsTooLarge(afi_safi, nlris.len()).log();
            unreach.extend(nlris);
            continue;
        };

        for chunk in pack(nlris, budget, cxt) {
            let mp_reach = MpReachNlri {
                afi_safi,
                nexthop,
                nlri: chunk,
            };
            msgs.push(Message::Update(UpdateMsg {
                mp_reach: Some(mp_reach),
                attrs: Some(attrs.clone()),
                ..Default::default()
            }));
        }
    }

    // Unreachable routes.
    if !unreach.is_empty() {
        let mp_header = encoded_attr_len(
            &Attr::MpUnreach(MpUnreachNlri {
                afi_safi,
                nlri: vec![],
            }),
            cxt,
        );
        let budget = max_payload().saturating_sub(mp_header);

        for chunk in pack(unreach, budget, cxt) {
            let mp_unreach = MpUnreachNlri {
                afi_safi,
                nlri: chunk,
            };
            msgs.push(Message::Update(UpdateMsg {
                mp_unreach: Some(mp_unreach),
                ..Default::default()
            }));
        }
    }

    msgs
}

// Builds UPDATE messages carrying IPv4 unicast routes in the NLRI and
// withdrawn routes fields.
fn build_classic_updates(
    support: &dyn RibSupport,
    queue: &mut UpdateQueue,
    cxt: &EncodeCxt,
) -> Vec<Message> {
    let mut msgs = vec![];
    let reach = std::mem::take(&mut queue.reach);
    let mut unreach = std::mem::take(&mut queue.unreach);

    // Reachable prefixes.
    for (attrs, nlris) in reach {
        let Some(MpNexthop::Ipv4(nexthop)) = support.nexthop_tx(&attrs.base)
        else {
            continue;
        };
        let mut buf = BytesMut::new();
        attrs.encode(&mut buf, Some(nexthop), cxt);
        let Some(budget) = nlri_budget(buf.len()) else {
            Debug::UpdateAttrsTooLarge(support.afi_safi(), nlris.len()).log();
            unreach.extend(nlris);
            continue;
        };

        for chunk in pack(nlris, budget, cxt) {
            msgs.push(Message::Update(UpdateMsg {
                reach: Some(ReachNlri {
                    nlri: chunk,
                    nexthop,
                }),
                attrs: Some(attrs.clone()),
                ..Default::default()
            }));
        }
    }

    // Unreachable prefixes.
    if !unreach.is_empty() {
        for chunk in pack(unreach, max_payload(), cxt) {
            msgs.push(Message::Update(UpdateMsg {
                unreach: Some(UnreachNlri { nlri: chunk }),
                ..Default::default()
            }));
        }
    }

    msgs
}

// ===== helper functions =====

// Number of bytes available for attributes and NLRI in a single UPDATE.
fn max_payload() -> usize {
    (Message::MAX_LEN - UpdateMsg::MIN_LEN) as usize
}

// Bytes left for NLRI once the attributes are encoded. Returns `None` when the
// attributes leave no room for them.
fn nlri_budget(attrs_len: usize) -> Option<usize> {
    max_payload()
        .checked_sub(attrs_len)
        .filter(|budget| *budget > 0)
}

// Length of an encoded attribute, assuming the extended length form might be
// needed once NLRI are added to it.
fn encoded_attr_len(attr: &Attr, cxt: &EncodeCxt) -> usize {
    let mut buf = BytesMut::new();
    attribute::encode_attr(attr, &mut buf, cxt);
    buf.len() + 1
}

// Splits the NLRI into groups whose encoded size doesn't exceed the given
// budget. Entries that don't fit on their own are dropped.
fn pack(
    nlris: impl IntoIterator<Item = Nlri>,
    budget: usize,
    cxt: &EncodeCxt,
) -> Vec<Vec<NlriEntry>> {
    let mut chunks = vec![];
    let mut chunk = vec![];
    let mut chunk_len = 0;
    let mut buf = BytesMut::new();

    for nlri in nlris {
        let entry = NlriEntry::new(nlri);
        buf.clear();
        entry.encode(&mut buf, cxt);
        if buf.len() > budget {
            Debug::NlriTooLarge(&entry.nlri, buf.len()).log();
            continue;
        }
        if chunk_len + buf.len() > budget && !chunk.is_empty() {
            chunks.push(std::mem::take(&mut chunk));
            chunk_len = 0;
        }
        chunk_len += buf.len();
        chunk.push(entry);
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }

    chunks
}

// ===== unit tests =====
