use crate::commands::Command;
use crate::config::{Config, SocketDelivery};
use crate::gateway::Gateway;
use crate::net::ConnectionType;
use crate::tests::mock::{contains, count, init_logger, wait_until, FakeStack, MockWifi, SerialSink};
use crate::transport::AtReader;
use crate::wifi::{WifiError, WifiEvent};
use core::net::{Ipv4Addr, SocketAddrV4};
use core::sync::atomic::Ordering;
use core::time::Duration;
use mockall::predicate::eq;

const OK: &[u8] = b"\r\nOK\r\n";
const ERROR: &[u8] = b"\r\nERROR\r\n";

type TestGateway = Gateway<FakeStack, MockWifi>;

fn config() -> Config {
    Config::default()
        .with_recv_poll_interval(Duration::from_millis(20))
        .with_monitor_settle(Duration::ZERO)
}

fn gateway_with(stack: FakeStack, wifi: MockWifi, config: Config) -> (TestGateway, SerialSink) {
    init_logger();
    let sink = SerialSink::new();
    let gateway = Gateway::new(config, stack, wifi, sink.clone()).unwrap();
    (gateway, sink)
}

fn gateway() -> (TestGateway, SerialSink) {
    gateway_with(FakeStack::new(), MockWifi::new(), config())
}

fn concat(frames: &[&[u8]]) -> Vec<u8> {
    frames.concat()
}

fn resolve(input: &[u8]) -> (Option<Command>, usize) {
    let mut reader = AtReader::new(input);
    let command = Command::resolve(&mut reader).unwrap();
    (command, reader.consumed())
}

#[test]
fn test_resolve_commands() {
    assert_eq!((Some(Command::CipStart), 8), resolve(b"CIPSTART=0"));
    assert_eq!((Some(Command::CipSend), 7), resolve(b"CIPSEND=0"));
    assert_eq!((Some(Command::CipStop), 7), resolve(b"CIPSTOP=0"));
    assert_eq!((Some(Command::CipDomain), 9), resolve(b"CIPDOMAIN=a"));
    assert_eq!((Some(Command::CipAutoConn), 11), resolve(b"CIPAUTOCONN=0"));
    assert_eq!((Some(Command::WifiJoin), 5), resolve(b"WJAP=ssid"));
    assert_eq!((Some(Command::WifiIpInfo), 7), resolve(b"WJAPIP?\r"));
    assert_eq!((Some(Command::WifiMac), 5), resolve(b"WMAC?\r"));
    assert_eq!((Some(Command::UartEcho), 5), resolve(b"UARTE=ON"));
    assert_eq!((Some(Command::YwssStartMonitor), 17), resolve(b"YWSSSTARTMONITOR\r"));
    assert_eq!((Some(Command::YwssStopMonitor), 16), resolve(b"YWSSSTOPMONITOR\r"));
    assert_eq!((Some(Command::YwssSetChannel), 15), resolve(b"YWSSSETCHANNEL,6\r"));
    assert_eq!((Some(Command::YwssSuspendStation), 19), resolve(b"YWSSSUSPENDSTATION\r"));
}

#[test]
fn test_resolve_unknown_consumes_examined_bytes() {
    assert_eq!((None, 1), resolve(b"XCIPSTART"));
    assert_eq!((None, 3), resolve(b"CXPSTART"));
    assert_eq!((None, 7), resolve(b"CIPSTAT=0"));
    assert_eq!((None, 4), resolve(b"CIPX"));
    assert_eq!((None, 5), resolve(b"WJAPX"));
    assert_eq!((None, 8), resolve(b"YWSSSXYZ"));
}

#[test]
fn test_command_names() {
    assert_eq!("CIPSTART", Command::CipStart.name());
    assert_eq!("WJAPIP", Command::WifiIpInfo.name());
    assert!(Command::YwssSetChannel.is_onboarding());
    assert!(!Command::CipSend.is_onboarding());
}

#[test]
fn test_cipstart_tcp_client() {
    let (mut gateway, sink) = gateway();

    gateway.serve(&b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\r"[..]).unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:0,SERVER,CONNECTED\r\n"]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert_eq!(1, gateway.registry().len());

    let socket = gateway.stack.socket(0);
    assert_eq!(Some(socket.handle), gateway.registry().find_by_link_id(0));
    assert_eq!(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9000), socket.remote);
    assert_eq!(ConnectionType::TcpClient, socket.conn_type);
}

#[test]
fn test_cipstart_udp_event() {
    let (mut gateway, sink) = gateway();

    gateway.serve(&b"AT+CIPSTART=3,udp_unicast,10.0.0.1,53\r"[..]).unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:3,UDP,CONNECTED\r\n"]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert_eq!(Some(ConnectionType::UdpUnicast), gateway.registry().conn_type_of(gateway.stack.socket(0).handle));
}

#[test]
fn test_cipstart_duplicate_link_id() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(&b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\rAT+CIPSTART=0,tcp_client,10.0.0.2,9000\r"[..])
        .unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:0,SERVER,CONNECTED\r\n", ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert_eq!(1, gateway.registry().len());
    assert_eq!(1, gateway.stack.opened());
}

#[test]
fn test_cipstart_sixth_link_rejected() {
    let (mut gateway, sink) = gateway();

    for link_id in 0..5 {
        let command = format!("AT+CIPSTART={},tcp_client,10.0.0.1,{}\r", link_id, 9000 + link_id);
        gateway.serve(command.as_bytes()).unwrap();
    }
    gateway.serve(&b"AT+CIPSTART=5,tcp_client,10.0.0.1,9005\r"[..]).unwrap();

    assert!(sink.wait_contains(ERROR));
    assert_eq!(5, count(&sink.data(), b"CONNECTED"));
    assert_eq!(5, gateway.registry().len());
    assert_eq!(5, gateway.stack.opened());
    for link_id in 0..5 {
        assert_eq!(
            Some(gateway.stack.socket(link_id).handle),
            gateway.registry().find_by_link_id(link_id)
        );
    }
}

#[test]
fn test_cipstart_invalid_arguments() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(
            &b"AT+CIPSTART=0,tcp,10.0.0.1,9000\r\
               AT+CIPSTART=0,tcp_client,10.0.0.1,0\r\
               AT+CIPSTART=0,tcp_client,10.0.0.300,80\r\
               AT+CIPSTART=0,tcp_client,10.0.0.1\r\
               AT+CIPSTART=0,TCP_CLIENT,10.0.0.1,80\r\
               AT+CIPSTART=9,tcp_client,10.0.0.1,80\r"[..],
        )
        .unwrap();

    assert!(wait_until(|| count(&sink.data(), ERROR) == 6));
    assert!(gateway.registry().is_empty());
    assert_eq!(0, gateway.stack.opened());
}

#[test]
fn test_cipstart_unsupported_types() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(&b"AT+CIPSTART=0,tcp_server,10.0.0.1,80\rAT+CIPSTART=0,ssl_client,10.0.0.1,443\r"[..])
        .unwrap();

    let expected = concat(&[ERROR, ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert!(gateway.registry().is_empty());
}

#[test]
fn test_cipstart_connect_failed() {
    let stack = FakeStack::new();
    stack.refuse.store(true, Ordering::Release);
    let (mut gateway, sink) = gateway_with(stack, MockWifi::new(), config());

    gateway.serve(&b"AT+CIPSTART=1,tcp_client,10.0.0.1,80\r"[..]).unwrap();

    assert_eq!(ERROR.to_vec(), sink.wait_for(ERROR));
    assert!(gateway.registry().is_empty());
}

#[test]
fn test_cipsend_inline() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(&b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\rAT+CIPSEND=0,4\rab\rc"[..])
        .unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:0,SERVER,CONNECTED\r\n", OK]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert_eq!(vec![(None, b"ab\rc".to_vec())], gateway.stack.socket(0).sent_payloads());
    assert!(wait_until(|| gateway.stats().socket.queued_bytes == 0));
}

#[test]
fn test_cipsend_payload_not_dispatched() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(&b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\rAT+CIPSEND=0,9\rAT+XYZ=1\r"[..])
        .unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:0,SERVER,CONNECTED\r\n", OK]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert_eq!(b"AT+XYZ=1\r".to_vec(), gateway.stack.socket(0).sent_payloads()[0].1);
}

#[test]
fn test_cipsend_queued_sends_once() {
    let config = config().with_socket_delivery(SocketDelivery::Queued);
    let (mut gateway, sink) = gateway_with(FakeStack::new(), MockWifi::new(), config);

    gateway
        .serve(&b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\rAT+CIPSEND=0,4\rdata"[..])
        .unwrap();

    let socket = gateway.stack.socket(0);
    assert!(wait_until(|| socket.sent_payloads().len() == 1));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(vec![(None, b"data".to_vec())], socket.sent_payloads());
    assert!(sink.wait_contains(b"CONNECTED\r\n\r\nOK\r\n"));
}

#[test]
fn test_cipsend_udp_broadcast_remote_port() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(
            &b"AT+CIPSTART=2,udp_broadcast,192.168.0.255,5000\r\
               AT+CIPSEND=2,3\rabc\
               AT+CIPSEND=2,6000,2\rde"[..],
        )
        .unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:2,UDP,CONNECTED\r\n", OK, OK]);
    assert_eq!(expected, sink.wait_for(&expected));

    let broadcast = Ipv4Addr::new(192, 168, 0, 255);
    assert_eq!(
        vec![
            (Some(SocketAddrV4::new(broadcast, 5000)), b"abc".to_vec()),
            (Some(SocketAddrV4::new(broadcast, 6000)), b"de".to_vec()),
        ],
        gateway.stack.socket(0).sent_payloads()
    );
}

#[test]
fn test_cipsend_invalid_length() {
    let config = config().with_max_send_length(8);
    let (mut gateway, sink) = gateway_with(FakeStack::new(), MockWifi::new(), config);

    gateway
        .serve(&b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\rAT+CIPSEND=0,0\rAT+CIPSEND=0,9\r"[..])
        .unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:0,SERVER,CONNECTED\r\n", ERROR, ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert!(gateway.stack.socket(0).sent_payloads().is_empty());
}

#[test]
fn test_cipsend_unknown_link_consumes_payload() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(&b"AT+CIPSEND=1,5\rAT+XYAT+CIPSTOP=1\r"[..])
        .unwrap();

    // Payload is skipped, so CIPSTOP is parsed and fails as well
    let expected = concat(&[ERROR, ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
}

#[test]
fn test_cipsend_transmit_failure() {
    let (mut gateway, sink) = gateway();

    gateway.serve(&b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\r"[..]).unwrap();
    gateway.stack.socket(0).broken.store(true, Ordering::Release);
    gateway.serve(&b"AT+CIPSEND=0,2\rxy"[..]).unwrap();

    let expected = concat(&[OK, b"\r\n+CIPEVENT:0,SERVER,CONNECTED\r\n", ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
}

#[test]
fn test_cipstop() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(&b"AT+CIPSTART=4,tcp_client,10.0.0.1,9000\rAT+CIPSTOP=4\rAT+CIPSTOP=4\r"[..])
        .unwrap();

    let expected = concat(&[
        OK,
        b"\r\n+CIPEVENT:4,SERVER,CONNECTED\r\n",
        OK,
        b"\r\n+CIPEVENT:4,SERVER,CLOSED\r\n",
        ERROR,
    ]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert!(gateway.registry().is_empty());
    assert!(gateway.stack.socket(0).is_closed());

    // Receive task does not report the closing again
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(1, count(&sink.data(), b"CLOSED"));
}

#[test]
fn test_cipstop_frees_link_id() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(
            &b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\r\
               AT+CIPSTOP=0\r\
               AT+CIPSTART=0,tcp_client,10.0.0.2,9000\r"[..],
        )
        .unwrap();

    assert!(wait_until(|| count(&sink.data(), b"CONNECTED") == 2));
    assert_eq!(Some(gateway.stack.socket(1).handle), gateway.registry().find_by_link_id(0));
}

#[test]
fn test_cipautoconn() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(
            &b"AT+CIPSTART=1,tcp_client,10.0.0.1,9000\r\
               AT+CIPAUTOCONN=1,1\
               AT+CIPAUTOCONN=1,2\
               AT+CIPAUTOCONN=1,0"[..],
        )
        .unwrap();

    let expected = concat(&[
        OK,
        b"\r\n+CIPEVENT:1,SERVER,CONNECTED\r\n",
        OK,
        ERROR,
        OK,
        b"\r\n+CIPEVENT:1,SERVER,CLOSED\r\n",
    ]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert!(gateway.registry().is_empty());
}

#[test]
fn test_cipautoconn_unknown_link() {
    let (mut gateway, sink) = gateway();

    gateway
        .serve(&b"AT+CIPAUTOCONN=3,1\rAT+CIPAUTOCONN=3,0\r"[..])
        .unwrap();

    let expected = concat(&[ERROR, ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert!(gateway.registry().is_empty());
}

#[test]
fn test_cipdomain() {
    let stack = FakeStack::new().with_domain("example.com", Ipv4Addr::new(93, 184, 216, 34));
    let (mut gateway, sink) = gateway_with(stack, MockWifi::new(), config());

    gateway
        .serve(&b"AT+CIPDOMAIN=example.com\rAT+CIPDOMAIN=unknown.invalid\r"[..])
        .unwrap();

    let expected = concat(&[b"\r\nAT+CIPDOMAIN:0\r\n93.184.216.34\r\nOK\r\n", ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
}

#[test]
fn test_unknown_command() {
    let (mut gateway, sink) = gateway();

    gateway.serve(&b"AT+FOO\rAT+CIPSTOP=0\r"[..]).unwrap();

    let expected = concat(&[ERROR, ERROR]);
    assert_eq!(expected, sink.wait_for(&expected));
}

#[test]
fn test_wjap() {
    let mut wifi = MockWifi::new();
    wifi.expect_start_station()
        .withf(|credentials, _| credentials.ssid.as_str() == "home" && credentials.key.as_str() == "pass word")
        .times(1)
        .returning(|_, events| {
            events.notify(WifiEvent::IpObtained);
            Ok(())
        });
    let (mut gateway, sink) = gateway_with(FakeStack::new(), wifi, config());
    assert!(!gateway.is_ip_ready());

    gateway.serve(&b"AT+WJAP=home,pass word\r"[..]).unwrap();

    let expected = concat(&[b"\r\n+WEVENT:STATION_UP\r\n", OK]);
    assert_eq!(expected, sink.wait_for(&expected));
    assert!(gateway.is_ip_ready());
}

#[test]
fn test_wjap_failures() {
    let mut wifi = MockWifi::new();
    wifi.expect_start_station().times(1).returning(|_, _| Err(WifiError::Hal(-3)));
    let (mut gateway, sink) = gateway_with(FakeStack::new(), wifi, config());

    let long_ssid = format!("AT+WJAP={},key\r", "s".repeat(33));
    gateway.serve(long_ssid.as_bytes()).unwrap();
    gateway.serve(&b"AT+WJAP=home\r"[..]).unwrap();
    gateway.serve(&b"AT+WJAP=home,key\r"[..]).unwrap();

    assert!(wait_until(|| count(&sink.data(), ERROR) == 3));
    assert!(!gateway.is_ip_ready());
}

#[test]
fn test_wjapip_and_wmac() {
    let mut wifi = MockWifi::new();
    wifi.expect_ip_status()
        .times(2)
        .returning(|| Ok(MockWifi::ip_status_fixture()));
    let (mut gateway, sink) = gateway_with(FakeStack::new(), wifi, config());

    gateway.serve(&b"AT+WJAPIP?\rAT+WMAC?\r"[..]).unwrap();

    let expected = concat(&[
        b"\r\nAT+WJAPIP:192.168.1.23,255.255.255.0,192.168.1.1,8.8.8.8\rOK\r\n",
        b"\r\nAT+WMAC:10521c0aff0e\rOK\r\n",
    ]);
    assert_eq!(expected, sink.wait_for(&expected));
}

#[test]
fn test_wjapip_unavailable() {
    let mut wifi = MockWifi::new();
    wifi.expect_ip_status().returning(|| Err(WifiError::Unsupported));
    let (mut gateway, sink) = gateway_with(FakeStack::new(), wifi, config());

    gateway.serve(&b"AT+WJAPIP?\r"[..]).unwrap();

    assert_eq!(ERROR.to_vec(), sink.wait_for(ERROR));
}

#[test]
fn test_uart_echo() {
    let (mut gateway, sink) = gateway();

    gateway.serve(&b"AT+UARTE=ON\rAT+hello,world\r"[..]).unwrap();
    assert!(gateway.is_echo_enabled());
    assert!(sink.wait_contains(b"AT+hello,world\r"));

    gateway.serve(&b"AT+UARTE=OFF\rAT+CIPSTOP=0\r"[..]).unwrap();
    assert!(!gateway.is_echo_enabled());

    assert!(wait_until(|| count(&sink.data(), OK) == 3));
    assert!(sink.wait_contains(ERROR));
    assert!(!contains(&sink.data(), b"AT+UARTE=OFF"));
}

#[test]
fn test_uart_echo_line_too_long() {
    let config = config().with_echo_line_capacity(4);
    let (mut gateway, sink) = gateway_with(FakeStack::new(), MockWifi::new(), config);

    gateway.serve(&b"AT+UARTE=ON\rAT+too long\rAT+abcd\r"[..]).unwrap();

    assert!(sink.wait_contains(b"AT+MSG too long"));
    assert!(sink.wait_contains(b"AT+abcd\r"));
    assert!(gateway.is_echo_enabled());
}

#[test]
fn test_uart_echo_off_exact_line() {
    let (mut gateway, sink) = gateway();

    gateway.serve(&b"AT+UARTE=ON\rAT+UARTE=OF\rAT+\r"[..]).unwrap();

    assert!(sink.wait_contains(b"AT+UARTE=OF\r"));
    assert!(wait_until(|| count(&sink.data(), OK) == 3));
    assert!(gateway.is_echo_enabled());
}

#[test]
fn test_uart_echo_invalid_mode() {
    let (mut gateway, sink) = gateway();

    gateway.serve(&b"AT+UARTE=MAYBE\r"[..]).unwrap();

    assert_eq!(ERROR.to_vec(), sink.wait_for(ERROR));
    assert!(!gateway.is_echo_enabled());
}

#[test]
fn test_ywss_monitor() {
    let mut wifi = MockWifi::new();
    wifi.expect_start_monitor().times(1).returning(|frames| {
        frames.monitor_frame(-50, b"frame").unwrap();
        Ok(())
    });
    wifi.expect_stop_monitor().times(1).returning(|| Ok(()));
    let (mut gateway, sink) = gateway_with(FakeStack::new(), wifi, config());

    gateway
        .serve(&b"AT+YWSSSTARTMONITOR\rAT+YWSSSTOPMONITOR\r"[..])
        .unwrap();

    let expected = concat(&[
        OK,
        b"\r\n+YEVENT:MONITOR_UP\r\n",
        b"+YEVENT:-50,5,frame",
        OK,
        b"\r\n+YEVENT:MONITOR_DOWN\r\n",
    ]);
    assert_eq!(expected, sink.wait_for(&expected));
}

#[test]
fn test_ywss_channel_and_suspend() {
    let mut wifi = MockWifi::new();
    wifi.expect_set_channel().with(eq(11)).times(1).returning(|_| Ok(()));
    wifi.expect_suspend_station().times(1).returning(|| Ok(()));
    let (mut gateway, sink) = gateway_with(FakeStack::new(), wifi, config());

    gateway
        .serve(&b"AT+YWSSSETCHANNEL,11\rAT+YWSSSETCHANNEL,300\rAT+YWSSSUSPENDSTATION\r"[..])
        .unwrap();

    let expected = concat(&[OK, ERROR, OK]);
    assert_eq!(expected, sink.wait_for(&expected));
}

#[test]
fn test_ywss_failure_replied_immediately() {
    let mut wifi = MockWifi::new();
    wifi.expect_suspend_station().returning(|| Err(WifiError::Hal(1)));
    let (mut gateway, sink) = gateway_with(FakeStack::new(), wifi, config());

    gateway.serve(&b"AT+YWSSSUSPENDSTATION\r"[..]).unwrap();

    assert_eq!(ERROR.to_vec(), sink.wait_for(ERROR));
    assert_eq!(0, gateway.stats().serial.enqueue_failures);
}
