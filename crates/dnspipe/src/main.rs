mod cli;

use std::time::Duration;

use clap::Parser;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use log::error;
use tokio_util::sync::CancellationToken;

use dnspipe_core::config::{build_registry, RouterConfig};
use dnspipe_core::handler::{PluginFactory, QueryContext};
use dnspipe_core::utils::servfail_reply;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = cli::Cli::parse();
    if let Err(e) = run(args).await {
        eprintln!("dnspipe: {e}");
        std::process::exit(1);
    }
}

async fn run(args: cli::Cli) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(&args.config)?;
    let config: RouterConfig = serde_yaml::from_str(&raw)?;

    let factory = PluginFactory::with_defaults();
    let registry = build_registry(&config, &factory).await?;

    let entry = match args.entry.or(config.entry) {
        Some(tag) => tag,
        None => {
            return Err("no entry plugin configured (set `entry` in the config or pass --entry)".into());
        }
    };

    let mut name = Name::from_utf8(&args.name)?;
    if !name.is_fqdn() {
        name.set_fqdn(true);
    }
    let qtype: RecordType = args.qtype.parse()?;

    let mut query = Message::new();
    query.set_id(rand::random());
    query.set_message_type(MessageType::Query);
    query.set_op_code(OpCode::Query);
    query.set_recursion_desired(true);
    query.add_query(Query::query(name, qtype));

    let token = CancellationToken::new();
    let deadline = token.clone();
    let timeout = args.timeout;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout)).await;
        deadline.cancel();
    });

    let mut qctx = QueryContext::new(query);
    let handle = registry.get_executable(&entry).await?;
    if let Err(e) = handle.execute(&token, &mut qctx).await {
        // Listener contract: log the failure, answer SERVFAIL anyway.
        error!("{qctx}: {e}");
    }

    let response = match qctx.take_response() {
        Some(response) => response,
        None => servfail_reply(qctx.query()),
    };
    print_response(&response);
    Ok(())
}

fn print_response(response: &Message) {
    println!(
        ";; rcode: {}, id: {}, answers: {}",
        response.response_code(),
        response.id(),
        response.answers().len(),
    );
    for question in response.queries() {
        println!(";; question: {} {} {}", question.name(), question.query_class(), question.query_type());
    }
    for record in response.answers() {
        println!("{record}");
    }
    for record in response.name_servers() {
        println!("{record}");
    }
}
