//! Unit tests for BOOTP/DHCP/RARP discovery

#[cfg(test)]
mod tests {
    use crate::arp::ArpRole;
    use crate::config::{ClientConfig, Discovery};
    use crate::dhcp::{DhcpClient, machine_info};
    use crate::error::NetbootError;
    use crate::mock::{MockNic, frames};
    use crate::nic::DeviceId;
    use crate::options::{msg, tag};
    use crate::test_utils::*;
    use crate::wire::arp::{ARP_REPLY, ArpPacket, RARP_REQUEST};
    use crate::wire::bootp::{BOOTP_CLIENT, BOOTP_FIXED_LEN, BOOTP_REPLY, BOOTP_SERVER, BootpHeader, PROXYDHCP_SERVER};
    use crate::wire::{ETH_P_ARP, ETH_P_RARP, Mac};
    use dhcproto::v4::{Decodable, Decoder, DhcpOption, Message, MessageType, Opcode, OptionCode};
    use std::net::{Ipv4Addr, SocketAddrV4};

    const BOOTP_CLIENT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);
    const BOOTP_SERVER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    /// A plain BOOTP server: every reply starts from our request's xid,
    /// offers [`BOOTP_CLIENT_IP`] and is then adjusted by one of `edits`
    fn bootp_server(nic: &MockNic, edits: &[fn(&mut BootpHeader)]) {
        let edits = edits.to_vec();
        nic.set_responder(move |sent| {
            let Some(request) = ClientMessage::parse(sent) else {
                return Vec::new();
            };
            edits
                .iter()
                .map(|edit| {
                    let mut header = BootpHeader::request(request.header.xid, CLIENT_MAC);
                    header.op = BOOTP_REPLY;
                    header.yiaddr = BOOTP_CLIENT_IP;
                    header.siaddr = BOOTP_SERVER_IP;
                    edit(&mut header);
                    frames::udp(
                        SERVER_MAC,
                        CLIENT_MAC,
                        SocketAddrV4::new(BOOTP_SERVER_IP, BOOTP_SERVER),
                        SocketAddrV4::new(Ipv4Addr::BROADCAST, BOOTP_CLIENT),
                        &frames::bootp_reply(&header, "", None),
                    )
                })
                .collect()
        });
    }

    fn bootp_config() -> ClientConfig {
        ClientConfig { discovery: Discovery::Bootp, ..test_config() }
    }

    #[test]
    fn test_bootp_reply_without_options_binds_classful() {
        let nic = mock_nic();
        bootp_server(&nic, &[|_| {}]);
        let config = bootp_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let lease = dhcp.discover(&mut stack).unwrap();

        assert_eq!(lease.client, BOOTP_CLIENT_IP);
        assert_eq!(lease.netmask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(lease.tftp_server, BOOTP_SERVER_IP);
        assert_eq!(lease.dhcp_server, None);
        assert_eq!(lease.boot_file, "");
        let server = stack.arp_table().get(ArpRole::Server);
        assert_eq!(server.ip, BOOTP_SERVER_IP);
        assert!(server.mac.is_zero(), "server MAC is resolved on first use");
        assert_eq!(stack.client_ip(), BOOTP_CLIENT_IP);
    }

    #[test]
    fn test_bootrequest_is_understood_by_independent_decoder() {
        let nic = mock_nic();
        bootp_server(&nic, &[|_| {}]);
        let config = bootp_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);
        dhcp.discover(&mut stack).unwrap();

        let sent = client_messages(&nic);
        assert_eq!(sent.len(), 1);
        let request = &sent[0];
        assert_eq!(request.payload.len(), 300);
        assert_eq!(request.from, Ipv4Addr::UNSPECIFIED);
        assert_eq!(request.to, SocketAddrV4::new(Ipv4Addr::BROADCAST, BOOTP_SERVER));

        let decoded = Message::decode(&mut Decoder::new(&request.payload)).unwrap();
        assert_eq!(decoded.opcode(), Opcode::BootRequest);
        assert_eq!(decoded.xid(), dhcp.xid());
        assert_eq!(&decoded.chaddr()[..6], &CLIENT_MAC.0[..]);
        assert_eq!(decoded.opts().msg_type(), None, "plain BOOTP carries no DHCP message type");
    }

    #[test]
    fn test_replies_for_someone_else_are_ignored() {
        let nic = mock_nic().with_idle_step(100);
        bootp_server(
            &nic,
            &[
                |h| h.xid = h.xid.wrapping_add(1),
                |h| h.siaddr = Ipv4Addr::UNSPECIFIED,
                |h| h.chaddr = PEER_MAC,
                |h| h.op = 1,
            ],
        );
        let config = bootp_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let err = dhcp.discover(&mut stack).unwrap_err();
        assert!(matches!(err, NetbootError::NoServer), "got {err:?}");
        assert!(stack.client_ip().is_unspecified());
    }

    #[test]
    fn test_broadcast_chaddr_is_accepted() {
        let nic = mock_nic();
        bootp_server(&nic, &[|h| h.chaddr = Mac::BROADCAST]);
        let config = bootp_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        assert_eq!(dhcp.discover(&mut stack).unwrap().client, BOOTP_CLIENT_IP);
    }

    #[test]
    fn test_relay_agent_becomes_gateway() {
        let nic = mock_nic();
        bootp_server(&nic, &[|h| h.giaddr = Ipv4Addr::new(192, 168, 1, 254)]);
        let config = bootp_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let lease = dhcp.discover(&mut stack).unwrap();
        assert_eq!(lease.relay, Some(Ipv4Addr::new(192, 168, 1, 254)));
        assert_eq!(lease.gateway, Some(Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn test_offer_request_ack_binds() {
        let nic = mock_nic();
        LabServer::default().install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let lease = dhcp.discover(&mut stack).unwrap();

        assert_eq!(lease.client, CLIENT_IP);
        assert_eq!(lease.netmask, NETMASK);
        assert_eq!(lease.gateway, Some(GATEWAY_IP));
        assert_eq!(lease.dhcp_server, Some(SERVER_IP));
        assert_eq!(lease.tftp_server, SERVER_IP);
        assert_eq!(lease.proxy_dhcp, None);
        assert_eq!(lease.boot_file, "pxelinux.0");
        assert_eq!(dhcp.options().message_type(), Some(msg::ACK));

        let sent = client_messages(&nic);
        let types: Vec<Option<u8>> = sent.iter().map(ClientMessage::msg_type).collect();
        assert_eq!(types, vec![Some(msg::DISCOVER), Some(msg::REQUEST)]);
        let request = &sent[1];
        assert_eq!(request.header.xid, sent[0].header.xid);
        assert_eq!(request.option(tag::REQUESTED_IP), Some(&CLIENT_IP.octets()[..]));
        assert_eq!(request.option(tag::SERVER_ID), Some(&SERVER_IP.octets()[..]));
        assert_eq!(request.from, CLIENT_IP, "the REQUEST is sent from the offered address");
        assert_eq!(request.to, SocketAddrV4::new(Ipv4Addr::BROADCAST, BOOTP_SERVER));
    }

    #[test]
    fn test_offers_are_collected_for_the_whole_window() {
        let nic = mock_nic();
        LabServer::default().install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);
        dhcp.discover(&mut stack).unwrap();

        let sent = client_messages(&nic);
        assert_eq!(sent[0].header.secs, 0);
        assert!(sent[1].header.secs >= 2, "secs counts from the first DISCOVER");
    }

    #[test]
    fn test_discover_identifies_the_client() {
        let nic = mock_nic().with_device_id(DeviceId { bus_type: 1, vendor_id: 0x8086, device_id: 0x100e });
        LabServer::default().install(&nic);
        let config = ClientConfig {
            client_id: Some("node-7".to_string()),
            user_class: Some("rack-a".to_string()),
            ..test_config()
        };
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);
        dhcp.discover(&mut stack).unwrap();

        let discover = &client_messages(&nic)[0];
        assert_eq!(discover.option(tag::VENDOR_CLASS_ID), Some(&b"Etherboot-5.4"[..]));
        assert_eq!(discover.option(tag::MAX_SIZE), Some(&1500u16.to_be_bytes()[..]));
        assert_eq!(discover.option(tag::CLIENT_ID), Some(&b"\x00node-7"[..]));
        assert_eq!(discover.option(tag::USER_CLASS), Some(&b"rack-a"[..]));
        let params = discover.option(tag::PARAM_LIST).unwrap();
        assert!(params.contains(&tag::NETMASK) && params.contains(&tag::DNS));
        let device = DeviceId { bus_type: 1, vendor_id: 0x8086, device_id: 0x100e };
        assert_eq!(discover.option(tag::ETHERBOOT_ENCAP), Some(&machine_info(device)[..]));
        assert!(discover.payload.len() > BOOTP_FIXED_LEN);
    }

    #[test]
    fn test_nak_restarts_discovery() {
        let nic = mock_nic();
        LabServer { naks: 1, ..LabServer::default() }.install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let lease = dhcp.discover(&mut stack).unwrap();
        assert_eq!(lease.client, CLIENT_IP);
        assert_eq!(lease.tftp_server, SERVER_IP);

        // The NAK has siaddr 0 and must still end the REQUEST loop at once
        let types: Vec<Option<u8>> = client_messages(&nic).iter().map(ClientMessage::msg_type).collect();
        assert_eq!(
            types,
            vec![Some(msg::DISCOVER), Some(msg::REQUEST), Some(msg::DISCOVER), Some(msg::REQUEST)]
        );
    }

    #[test]
    fn test_nak_without_siaddr_leaves_server_entry_alone() {
        let nic = mock_nic();
        LabServer { naks: 10, ..LabServer::default() }.install(&nic);
        let config = ClientConfig { max_bootp_retries: 1, ..test_config() };
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let err = dhcp.discover(&mut stack).unwrap_err();
        assert!(matches!(err, NetbootError::DhcpNak), "got {err:?}");
        assert_eq!(stack.arp_table().ip(ArpRole::Server), SERVER_IP, "set by the OFFER, kept through the NAK");
        assert_eq!(client_messages(&nic).len(), 2);
    }

    #[test]
    fn test_xid_mixes_station_and_ticks() {
        let nic = mock_nic();
        LabServer::default().install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);
        let started = stack.now();

        dhcp.discover(&mut stack).unwrap();

        let station = u32::from_be_bytes([CLIENT_MAC.0[2], CLIENT_MAC.0[3], CLIENT_MAC.0[4], CLIENT_MAC.0[5]]);
        #[allow(clippy::cast_possible_truncation, reason = "test clock stays small")]
        let expected = station ^ started as u32;
        assert_eq!(dhcp.xid(), expected);
        assert_eq!(client_messages(&nic)[0].header.xid, expected);
    }

    #[test]
    fn test_nak_on_every_attempt_is_reported() {
        let nic = mock_nic();
        LabServer { naks: 10, ..LabServer::default() }.install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let err = dhcp.discover(&mut stack).unwrap_err();
        assert!(matches!(err, NetbootError::DhcpNak), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_no_server_after_retries() {
        let nic = mock_nic().with_idle_step(100);
        LabServer { dhcp: false, ..LabServer::default() }.install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let err = dhcp.discover(&mut stack).unwrap_err();
        assert!(matches!(err, NetbootError::NoServer), "got {err:?}");
        assert_eq!(client_messages(&nic).len(), 2, "one DISCOVER per retry");
    }

    #[test]
    fn test_proxy_dhcp_supplies_boot_information() {
        let nic = mock_nic();
        LabServer { proxy: true, ..LabServer::default() }.install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let lease = dhcp.discover(&mut stack).unwrap();

        assert_eq!(lease.client, CLIENT_IP);
        assert_eq!(lease.dhcp_server, Some(SERVER_IP));
        assert_eq!(lease.proxy_dhcp, Some(PROXY_IP));
        assert_eq!(lease.tftp_server, PROXY_IP);
        assert_eq!(lease.boot_file, "pxe/boot.0");
        let resolved_proxy = nic.transmitted().iter().any(|t| {
            t.ethertype == ETH_P_ARP && ArpPacket::parse(&t.payload).is_some_and(|arp| arp.target_ip == PROXY_IP)
        });
        assert!(resolved_proxy, "the ProxyDHCP server is ARPed before the unicast request");

        let sent = client_messages(&nic);
        let proxy_request = sent.last().unwrap();
        assert_eq!(proxy_request.to, SocketAddrV4::new(PROXY_IP, PROXYDHCP_SERVER));
        assert_eq!(proxy_request.from, CLIENT_IP);
        assert_eq!(proxy_request.header.ciaddr, CLIENT_IP);

        let decoded = Message::decode(&mut Decoder::new(&proxy_request.payload)).unwrap();
        assert_eq!(decoded.opts().msg_type(), Some(MessageType::Request));
        assert_eq!(decoded.ciaddr(), CLIENT_IP);
        assert_eq!(decoded.xid(), dhcp.xid());
        assert!(matches!(
            decoded.opts().get(OptionCode::MaxMessageSize),
            Some(DhcpOption::MaxMessageSize(1500))
        ));
    }

    #[test]
    fn test_proxy_offers_ignored_when_disabled() {
        let nic = mock_nic();
        LabServer { proxy: true, ..LabServer::default() }.install(&nic);
        let config = ClientConfig { proxy_dhcp: false, ..test_config() };
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let lease = dhcp.discover(&mut stack).unwrap();
        assert_eq!(lease.proxy_dhcp, None);
        assert_eq!(lease.boot_file, "pxelinux.0");
        assert!(client_messages(&nic).iter().all(|m| m.to.port() != PROXYDHCP_SERVER));
    }

    #[test]
    fn test_arp_for_offered_address_answered_before_ack() {
        let nic = mock_nic();
        LabServer { arp_before_ack: true, ..LabServer::default() }.install(&nic);
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        dhcp.discover(&mut stack).unwrap();

        let replies: Vec<ArpPacket> = nic
            .transmitted()
            .iter()
            .filter(|t| t.ethertype == ETH_P_ARP && t.dest == SERVER_MAC)
            .filter_map(|t| ArpPacket::parse(&t.payload))
            .collect();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].opcode, ARP_REPLY);
        assert_eq!(replies[0].sender_ip, CLIENT_IP);
        assert_eq!(replies[0].sender_mac, CLIENT_MAC);
        assert_eq!(replies[0].target_ip, SERVER_IP);
    }

    #[test]
    fn test_rarp_assigns_address_and_boot_file() {
        let nic = mock_nic();
        nic.set_responder(|sent| {
            if sent.ethertype != ETH_P_RARP {
                return Vec::new();
            }
            vec![frames::rarp_reply(SERVER_MAC, SERVER_IP, CLIENT_MAC, CLIENT_IP)]
        });
        let config = ClientConfig { discovery: Discovery::Rarp, ..test_config() };
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let lease = dhcp.discover(&mut stack).unwrap();

        assert_eq!(lease.client, CLIENT_IP);
        assert_eq!(lease.netmask, Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(lease.tftp_server, SERVER_IP);
        assert_eq!(lease.boot_file, "/tftpboot/kernel.10.0.0.20");
        assert_eq!(stack.arp_table().get(ArpRole::Server).mac, SERVER_MAC);

        let sent = nic.transmitted();
        assert_eq!(sent[0].dest, Mac::BROADCAST);
        let request = ArpPacket::parse(&sent[0].payload).unwrap();
        assert_eq!(request.opcode, RARP_REQUEST);
        assert_eq!(request.target_mac, CLIENT_MAC);
    }

    #[test]
    fn test_rarp_without_answer() {
        let nic = mock_nic().with_idle_step(500);
        let config = ClientConfig { discovery: Discovery::Rarp, ..test_config() };
        let mut stack = new_stack(&nic, &config);
        let mut dhcp = DhcpClient::new(&config);

        let err = dhcp.discover(&mut stack).unwrap_err();
        assert!(matches!(err, NetbootError::NoServer), "got {err:?}");
        assert_eq!(nic.transmitted().len(), 2);
    }

    #[test]
    fn test_abort_during_discovery() {
        let nic = mock_nic();
        let config = test_config();
        let mut stack = new_stack(&nic, &config);
        stack.abort_handle().store(true, std::sync::atomic::Ordering::SeqCst);
        let mut dhcp = DhcpClient::new(&config);

        let err = dhcp.discover(&mut stack).unwrap_err();
        assert!(matches!(err, NetbootError::Aborted), "got {err:?}");
        assert!(!err.is_retryable());
    }
}
