//! 本机地址探测
//!
//! 桌面端需要把 `http://<局域网 IP>:<端口>/` 展示给手机（或编码成二维码），
//! 这里挑出第一个可用的局域网 IPv4 地址。

use std::net::{IpAddr, Ipv4Addr};

/// 返回本机非回环、非链路本地 (169.254.x.x) 的 IPv4 地址
pub fn local_ipv4s() -> Vec<Ipv4Addr> {
    if_addrs::get_if_addrs()
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_link_local() => Some(ip),
            _ => None,
        })
        .collect()
}

/// 第一个局域网 IPv4 地址，没有时回退到 127.0.0.1
pub fn local_ipv4() -> Ipv4Addr {
    local_ipv4s()
        .into_iter()
        .next()
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// 手机端访问的地址
pub fn server_url(ip: Ipv4Addr, port: u16) -> String {
    format!("http://{}:{}/", ip, port)
}

/// 本机主机名
pub fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "PhotoDrop".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_url() {
        assert_eq!(
            server_url(Ipv4Addr::new(192, 168, 1, 20), 5000),
            "http://192.168.1.20:5000/"
        );
    }

    #[test]
    fn test_local_ipv4_never_link_local() {
        let ip = local_ipv4();
        assert!(!ip.is_link_local());
        assert!(local_ipv4s().iter().all(|ip| !ip.is_loopback()));
    }
}
