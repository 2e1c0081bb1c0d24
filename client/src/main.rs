use clap::{Parser, Subcommand, ValueEnum};
use client::network::Client;
use client::session::sample_shop;
use log::info;
use shared::{
    ActionRequest, MailTiming, PeerId, PeerPredicate, TargetSelector, UNLIMITED_STOCK,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Shop to trade with
    #[arg(long, default_value = "ShopA")]
    shop: String,

    /// Seconds to wait for each reply from the server
    #[arg(short = 't', long, default_value = "2")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Buy from the shop and have the host debit the shared stock
    Buy {
        item: String,
        #[arg(default_value = "1")]
        amount: i32,
    },
    /// Grant or revoke a letter
    Mail {
        mail_id: String,
        #[arg(long, value_enum, default_value = "now")]
        timing: Timing,
        #[arg(long, value_enum, default_value = "all")]
        target: Target,
        /// Remove the letter instead of adding it
        #[arg(long)]
        remove: bool,
    },
    /// Mark an event as seen
    Event {
        event_id: String,
        #[arg(long, value_enum, default_value = "all")]
        target: Target,
        #[arg(long)]
        remove: bool,
    },
    /// Teach or forget a crafting recipe
    Recipe {
        recipe: String,
        #[arg(long, value_enum, default_value = "all")]
        target: Target,
        #[arg(long)]
        remove: bool,
    },
    /// End the day and wait for the next one
    EndDay,
    /// Print the reconciled shop view
    Stock,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Timing {
    Now,
    Tomorrow,
    Received,
    All,
}

impl From<Timing> for MailTiming {
    fn from(timing: Timing) -> Self {
        match timing {
            Timing::Now => MailTiming::Now,
            Timing::Tomorrow => MailTiming::Tomorrow,
            Timing::Received => MailTiming::Received,
            Timing::All => MailTiming::All,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Target {
    All,
    Host,
    Remote,
    /// Only this peer
    Me,
}

/// Resolves a CLI target, failing for `Me` until the host has assigned an id
fn selector(target: Target, peer_id: Option<PeerId>) -> Result<TargetSelector, String> {
    match target {
        Target::All => Ok(TargetSelector::All),
        Target::Host => Ok(TargetSelector::Matching(PeerPredicate::HostOnly)),
        Target::Remote => Ok(TargetSelector::Matching(PeerPredicate::RemoteOnly)),
        Target::Me => peer_id
            .map(|id| TargetSelector::Peers(vec![id]))
            .ok_or_else(|| "no peer id assigned, cannot target this peer".to_string()),
    }
}

async fn send_flag_action(
    client: &mut Client,
    target: Target,
    build: impl FnOnce(TargetSelector) -> ActionRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = build(selector(target, client.session().peer_id())?);
    client.send_action(&request).await?;
    if client
        .wait_for(|packet| matches!(packet, shared::Packet::PlayerSnapshot { .. }))
        .await?
        .is_some()
    {
        info!("Flags now: {:?}", client.session().flags());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut client = Client::new(
        &args.server,
        sample_shop(&args.shop),
        Duration::from_secs(args.timeout_secs),
    )
    .await?;
    client.connect().await?;
    info!(
        "Connected as peer {:?} on day {}",
        client.session().peer_id(),
        client.session().day()
    );

    let result = match args.command {
        Command::Buy { item, amount } => client.buy(&item, amount).await,
        Command::Mail {
            mail_id,
            timing,
            target,
            remove,
        } => {
            send_flag_action(&mut client, target, |selector| {
                ActionRequest::set_mail(selector, mail_id, timing.into(), !remove)
            })
            .await
        }
        Command::Event {
            event_id,
            target,
            remove,
        } => {
            send_flag_action(&mut client, target, |selector| {
                ActionRequest::set_event_seen(selector, event_id, !remove)
            })
            .await
        }
        Command::Recipe {
            recipe,
            target,
            remove,
        } => {
            send_flag_action(&mut client, target, |selector| {
                ActionRequest::set_crafting_recipe(selector, recipe, !remove)
            })
            .await
        }
        Command::EndDay => match client.end_day().await {
            Ok(Some(day)) => {
                info!("Day {} started", day);
                Ok(())
            }
            Ok(None) => Err("day sync did not finish in time".into()),
            Err(e) => Err(e),
        },
        Command::Stock => Ok(()),
    };

    let view = client.session().view();
    println!("{} (day {})", view.shop_id, client.session().day());
    for entry in &view.entries {
        let stock = if entry.stock == UNLIMITED_STOCK {
            "unlimited".to_string()
        } else {
            entry.stock.to_string()
        };
        println!(
            "  {:<16} {:>6}g  {:>9}  {:?}",
            entry.item.display_name, entry.price, stock, entry.mode
        );
    }

    client.disconnect().await?;
    result
}
