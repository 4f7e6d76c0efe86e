use std::io;
use std::time::Duration;

use clap::Parser;
use log::debug;
use smtps_mailer::authentication::Credentials;
use smtps_mailer::net::DEFAULT_HOST;
use smtps_mailer::{EmailMessage, MailSender, ServerAddress, SUBMISSIONS_PORT};

/// Sends one plaintext email over SMTPS.
#[derive(Parser, Debug)]
#[command(name = "send-email", version)]
struct Opt {
    /// Sender address
    #[arg(long)]
    from: String,
    /// Display name of the sender
    #[arg(long, default_value = "Sender Name")]
    from_name: String,
    /// Recipient address
    #[arg(long)]
    to: String,
    #[arg(long)]
    subject: String,
    #[arg(long)]
    body: String,
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = SUBMISSIONS_PORT)]
    port: u16,
    /// Login name, the sender address when omitted
    #[arg(long)]
    username: Option<String>,
    /// Login secret, e.g. an app password
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    password: String,
    /// Network timeout of each phase, 0 to wait forever
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

/// Logs in as `username`, or as the sender when none is given.
fn credentials(username: Option<String>, from: &str, password: String) -> Credentials {
    Credentials::new(username.unwrap_or_else(|| from.to_string()), password)
}

fn timeout(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    let Opt {
        from,
        from_name,
        to,
        subject,
        body,
        host,
        port,
        username,
        password,
        timeout_secs,
    } = Opt::parse();

    let message = match EmailMessage::from_parts(Some(&from_name), &from, &to, &subject, &body) {
        Ok(message) => message,
        Err(err) => {
            println!("Error : {}", err);
            return Ok(());
        }
    };

    let sender = MailSender::new(credentials(username, &from, password))
        .server(ServerAddress::new(host, port))
        .timeout(timeout(timeout_secs));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let sent = runtime.block_on(sender.send_and_report(&message, &mut io::stdout()))?;
    debug!("sent={}", sent);

    Ok(())
}
