use std::process;

use clap::{Parser, Subcommand};
use tasq_client::{ClientError, QueueClient};

#[derive(Parser)]
#[command(name = "tasq", about = "tasq task queue CLI")]
struct Cli {
    /// Server endpoint
    #[arg(long, default_value = "http://localhost:7711", global = true)]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage queues
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Produce and consume messages
    #[command(subcommand)]
    Message(MessageCommands),
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Create a new queue
    Create {
        /// Queue name
        name: String,
    },

    /// Delete a queue and all its messages
    Delete {
        /// Queue name
        name: String,
    },

    /// Show queue statistics
    Stat {
        /// Queue name
        name: String,
    },
}

#[derive(Subcommand)]
enum MessageCommands {
    /// Enqueue a message
    Put {
        /// Queue name
        queue: String,

        /// Message payload
        content: String,
    },

    /// Claim the oldest available message
    Get {
        /// Queue name
        queue: String,

        /// Lease seconds (queue default when omitted)
        #[arg(long)]
        lease: Option<i64>,
    },

    /// Delete a processed message
    Delete {
        /// Queue name
        queue: String,

        /// Message id
        id: u64,

        /// Receipt from the claim
        #[arg(long)]
        receipt: String,
    },

    /// Return a message to the queue
    Return {
        /// Queue name
        queue: String,

        /// Message id
        id: u64,

        /// Receipt from the claim
        #[arg(long)]
        receipt: String,
    },

    /// Extend the lease on a claimed message
    Extend {
        /// Queue name
        queue: String,

        /// Message id
        id: u64,

        /// Receipt from the claim
        #[arg(long)]
        receipt: String,

        /// Lease seconds to add (queue default when omitted)
        #[arg(long)]
        lease: Option<i64>,
    },
}

fn connect(endpoint: &str) -> QueueClient {
    match QueueClient::new(endpoint) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn fail(error: ClientError, context: &str) -> ! {
    match error {
        ClientError::InvalidQueueOperation(_) => {
            eprintln!("Error: {context} was rejected (receipt invalid or lease expired)");
        }
        ClientError::InvalidRequest(msg) => eprintln!("Error: {msg}"),
        ClientError::Transport(_) => eprintln!("Error: cannot reach the server"),
        other => eprintln!("Error: {other}"),
    }
    process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = connect(&cli.endpoint);

    match cli.command {
        Commands::Queue(QueueCommands::Create { name }) => {
            match client.create_queue(&name).await {
                Ok(()) => println!("Created queue \"{name}\""),
                Err(e) => fail(e, &format!("create queue \"{name}\"")),
            }
        }
        Commands::Queue(QueueCommands::Delete { name }) => {
            match client.delete_queue(&name).await {
                Ok(()) => println!("Deleted queue \"{name}\""),
                Err(e) => fail(e, &format!("delete queue \"{name}\"")),
            }
        }
        Commands::Queue(QueueCommands::Stat { name }) => {
            match client.get_queue_stat(&name).await {
                Ok(stat) => {
                    println!("queue:     {}", stat.queue);
                    println!("total:     {}", stat.message_total);
                    println!("available: {}", stat.message_available);
                }
                Err(e) => fail(e, &format!("stat queue \"{name}\"")),
            }
        }
        Commands::Message(MessageCommands::Put { queue, content }) => {
            match client.put_message(&queue, &content).await {
                Ok(()) => println!("Enqueued message to \"{queue}\""),
                Err(e) => fail(e, &format!("enqueue to \"{queue}\"")),
            }
        }
        Commands::Message(MessageCommands::Get { queue, lease }) => {
            match client.get_message(&queue, lease).await {
                Ok(Some(msg)) => {
                    println!("id:              {}", msg.id);
                    println!("receipt:         {}", msg.receipt);
                    println!("requeue count:   {}", msg.requeue_count);
                    println!("lease expires:   {}", msg.lease_expired_at);
                    println!("content:         {}", msg.content);
                }
                Ok(None) => println!("No message available"),
                Err(e) => fail(e, &format!("claim from \"{queue}\"")),
            }
        }
        Commands::Message(MessageCommands::Delete { queue, id, receipt }) => {
            match client.delete_message(&queue, id, &receipt).await {
                Ok(()) => println!("Deleted message {id}"),
                Err(e) => fail(e, &format!("delete message {id}")),
            }
        }
        Commands::Message(MessageCommands::Return { queue, id, receipt }) => {
            match client.return_message(&queue, id, &receipt).await {
                Ok(()) => println!("Returned message {id}"),
                Err(e) => fail(e, &format!("return message {id}")),
            }
        }
        Commands::Message(MessageCommands::Extend {
            queue,
            id,
            receipt,
            lease,
        }) => {
            match client.extend_message_lease(&queue, id, &receipt, lease).await {
                Ok(()) => println!("Extended lease on message {id}"),
                Err(e) => fail(e, &format!("extend lease on message {id}")),
            }
        }
    }
}
