use std::io;
use std::process::Command;

/// Assign `ip_cidr` to the host side of `iface_name` and bring the link up
pub fn configure_interface(iface_name: &str, ip_cidr: &str) -> io::Result<()> {
    // ip addr add <ip_cidr> dev <iface_name>
    run_ip(&["addr", "add", ip_cidr, "dev", iface_name])?;
    // ip link set up dev <iface_name>
    run_ip(&["link", "set", "up", "dev", iface_name])?;

    tracing::info!("Interface {} configured with {} and brought up", iface_name, ip_cidr);
    Ok(())
}

fn run_ip(args: &[&str]) -> io::Result<()> {
    let status = Command::new("ip").args(args).status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("`ip {}` failed with {}", args.join(" "), status),
        ));
    }
    Ok(())
}
