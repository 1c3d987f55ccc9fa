use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::models::Credentials;

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// Validate an IPv4 address (e.g., "192.168.1.1").
/// Returns true if the string is a valid dotted-decimal IPv4 address.
pub fn is_valid_ipv4(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u8>().is_ok())
}

/// Validate a hostname.
/// Allows alphanumeric, hyphens, dots, and underscores. No whitespace or shell metacharacters.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Drop a trailing prefix length: "10.0.0.1/24" -> "10.0.0.1"
pub fn strip_prefix_len(address: &str) -> String {
    address.split('/').next().unwrap_or_default().trim().to_string()
}

/// Parse "a.b.c.d/len" into its network address and prefix length
pub fn parse_ipv4_cidr(cidr: &str) -> Result<(Ipv4Addr, u8), String> {
    let (addr, len) = cidr
        .split_once('/')
        .ok_or_else(|| format!("Invalid subnet {}: missing prefix length", cidr))?;
    let addr: Ipv4Addr = addr
        .trim()
        .parse()
        .map_err(|e| format!("Invalid subnet {}: {}", cidr, e))?;
    let len: u8 = len
        .trim()
        .parse()
        .ok()
        .filter(|l| *l <= 32)
        .ok_or_else(|| format!("Invalid subnet {}: bad prefix length", cidr))?;

    let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
    Ok((Ipv4Addr::from(u32::from(addr) & mask), len))
}

/// Usable host addresses of a subnet, in order.
/// /31 and /32 have no network or broadcast address to skip.
pub fn subnet_hosts(cidr: &str) -> Result<Vec<Ipv4Addr>, String> {
    let (network, len) = parse_ipv4_cidr(cidr)?;
    let base = u32::from(network);
    let size: u64 = 1u64 << (32 - len as u32);

    let (first, last) = if len >= 31 { (0, size - 1) } else { (1, size - 2) };
    Ok((first..=last).map(|i| Ipv4Addr::from(base + i as u32)).collect())
}

/// Last octet of an IPv4 address (with or without prefix length)
pub fn last_octet(address: &str) -> Option<u8> {
    strip_prefix_len(address).parse::<Ipv4Addr>().ok().map(|ip| ip.octets()[3])
}

/// Truncate output to a maximum number of lines
pub fn truncate_lines(s: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= max_lines {
        s.to_string()
    } else {
        let truncated: Vec<&str> = lines[..max_lines].to_vec();
        format!("{}\n... ({} more lines)", truncated.join("\n"), lines.len() - max_lines)
    }
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("Invalid address {}:{}: {}", host, port, e))?
        .next()
        .ok_or_else(|| format!("No address found for {}:{}", host, port))
}

/// Create an SSH session and authenticate with password + keyboard-interactive.
/// Returns the authenticated Session. Uses the ssh2 crate (libssh2).
/// This is blocking, so call from a spawn_blocking context.
pub fn ssh_connect(host: &str, port: u16, creds: &Credentials, timeout_secs: u64) -> Result<ssh2::Session, String> {
    let addr = resolve_addr(host, port)?;
    let tcp = TcpStream::connect_timeout(&addr, Duration::from_secs(timeout_secs))
        .map_err(|e| format!("TCP connection failed: {}", e))?;

    tcp.set_read_timeout(Some(Duration::from_secs(timeout_secs)))
        .ok();
    tcp.set_write_timeout(Some(Duration::from_secs(timeout_secs)))
        .ok();

    let mut session = ssh2::Session::new()
        .map_err(|e| format!("Failed to create SSH session: {}", e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_secs as u32 * 1000);
    session.handshake()
        .map_err(|e| format!("SSH handshake failed: {}", e))?;

    // Try password auth first
    match session.userauth_password(&creds.username, &creds.password) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // Keyboard-interactive is what EOS offers by default
    let mut prompter = PasswordPrompt { password: creds.password.clone() };
    let _ = session.userauth_keyboard_interactive(&creds.username, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        Err("SSH authentication failed: all methods exhausted".to_string())
    }
}

/// Execute one command on an open session and return its output
fn ssh_exec_on_session(session: &ssh2::Session, cmd: &str) -> Result<String, String> {
    let mut channel = session.channel_session()
        .map_err(|e| format!("Failed to open channel: {}", e))?;

    channel.exec(cmd)
        .map_err(|e| format!("Failed to execute command: {}", e))?;

    let mut output = String::new();
    channel.read_to_string(&mut output)
        .map_err(|e| format!("Failed to read output: {}", e))?;

    channel.wait_close()
        .map_err(|e| format!("Failed to close channel: {}", e))?;

    Ok(output)
}

/// Connect once via SSH and run each command on its own channel,
/// returning (command, output) pairs.
/// This is blocking, so call from a spawn_blocking context.
pub fn ssh_run_commands(
    host: &str,
    port: u16,
    creds: &Credentials,
    commands: &[String],
    timeout_secs: u64,
) -> Result<Vec<(String, String)>, String> {
    let session = ssh_connect(host, port, creds, timeout_secs)?;
    commands
        .iter()
        .map(|cmd| ssh_exec_on_session(&session, cmd).map(|out| (cmd.clone(), out)))
        .collect()
}

/// Async wrapper for ssh_run_commands - runs in a blocking thread pool
pub async fn ssh_run_commands_async(
    host: &str,
    port: u16,
    creds: &Credentials,
    commands: &[String],
    timeout_secs: u64,
) -> Result<Vec<(String, String)>, String> {
    let host = host.to_string();
    let creds = creds.clone();
    let commands = commands.to_vec();

    tokio::task::spawn_blocking(move || {
        ssh_run_commands(&host, port, &creds, &commands, timeout_secs)
    })
    .await
    .map_err(|e| format!("Task join error: {}", e))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_ipv4() {
        assert!(is_valid_ipv4("172.20.20.11"));
        assert!(is_valid_ipv4("0.0.0.0"));
        assert!(!is_valid_ipv4(""));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.2.3"));
        assert!(!is_valid_ipv4("; rm -rf /"));
    }

    #[test]
    fn test_is_valid_hostname() {
        assert!(is_valid_hostname("access1"));
        assert!(is_valid_hostname("rtr1.lab.local"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("host name"));
        assert!(!is_valid_hostname("host;rm"));
    }

    #[test]
    fn test_strip_prefix_len() {
        assert_eq!(strip_prefix_len("172.20.20.11/24"), "172.20.20.11");
        assert_eq!(strip_prefix_len("10.0.0.1"), "10.0.0.1");
        assert_eq!(strip_prefix_len("2001:db8::1/64"), "2001:db8::1");
    }

    #[test]
    fn test_parse_cidr_normalizes_network() {
        assert_eq!(parse_ipv4_cidr("10.99.1.7/24").unwrap(), (Ipv4Addr::new(10, 99, 1, 0), 24));
        assert!(parse_ipv4_cidr("10.99.1.0").is_err());
        assert!(parse_ipv4_cidr("10.99.1.0/33").is_err());
        assert!(parse_ipv4_cidr("bogus/24").is_err());
    }

    #[test]
    fn test_subnet_hosts() {
        let hosts = subnet_hosts("10.99.1.0/29").unwrap();
        assert_eq!(hosts.len(), 6);
        assert_eq!(hosts[0], Ipv4Addr::new(10, 99, 1, 1));
        assert_eq!(hosts[5], Ipv4Addr::new(10, 99, 1, 6));

        assert_eq!(subnet_hosts("10.0.0.0/31").unwrap().len(), 2);
        assert_eq!(subnet_hosts("10.0.0.5/32").unwrap(), vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(subnet_hosts("10.99.1.0/24").unwrap().len(), 254);
    }

    #[test]
    fn test_last_octet() {
        assert_eq!(last_octet("172.20.20.12/24"), Some(12));
        assert_eq!(last_octet("nope"), None);
    }

    #[test]
    fn test_truncate_lines() {
        assert_eq!(truncate_lines("a\nb", 5), "a\nb");
        assert_eq!(truncate_lines("a\nb\nc", 2), "a\nb\n... (1 more lines)");
    }
}
