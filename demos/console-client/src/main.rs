//! Terminal client for Mystery Online.
//!
//! ```text
//! cargo run -p console-client -- irc.example.net "#mystery-online" Ace
//! ```
//!
//! Plain lines are spoken in character. Commands:
//! `/ooc text`, `/roll 2d6`, `/loc name`, `/char name`, `/music url`,
//! `/stop`, `/clear`, `/pm nick text`, `/quit`.

use mystery::prelude::*;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use mystery::tick::TickScheduler;

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

struct Console {
    location: String,
    character: Option<String>,
}

impl SessionEvents for Console {
    fn on_join(&mut self, username: &str) {
        println!("* {username} has joined.");
    }

    fn on_quit(&mut self, username: &str) {
        println!("* {username} has disconnected.");
    }

    fn on_roster(&mut self, roster: Roster) {
        println!("* here: {}", roster.members.join(", "));
    }

    fn on_nickname_conflict(&mut self, nickname: &str) -> Option<String> {
        let alternative = format!("{nickname}_");
        println!("* {nickname} is taken, trying {alternative}");
        Some(alternative)
    }
}

impl Presenter for Console {
    fn on_chat(&mut self, message: ChatMessage) {
        let who = if message.is_local() { "You" } else { message.sender.as_str() };
        println!(
            "[{}/{}] {} ({}): {}",
            message.fields.location, message.fields.sublocation, message.fields.character, who,
            message.text
        );
    }

    fn on_char(&mut self, character: &str, sender: &str) {
        println!("* {sender} is now playing {character}.");
    }

    fn on_loc(&mut self, location: &str, sender: &str) {
        println!("* {sender} moved to {location}.");
    }

    fn on_ooc(&mut self, text: &str, sender: &str) {
        println!("(OOC) {}: {text}", display_name(sender));
    }

    fn on_music(&mut self, command: MusicCommand, sender: &str) {
        match command {
            MusicCommand::Play(url) => println!("* {sender} changed the music: {url}"),
            MusicCommand::Stop => println!("* {sender} stopped the music."),
        }
    }

    fn on_roll(&mut self, result: &str, sender: &str) {
        println!("* {} rolled {result}.", display_name(sender));
    }

    fn on_item(&mut self, item: ItemPayload, sender: &str) {
        println!("* {} presented {}.", display_name(sender), item.name);
    }

    fn on_clear(&mut self) {
        println!("--------");
    }

    fn on_private_message(&mut self, message: PrivateEnvelope) {
        println!("(PM {} -> {}) {}", message.sender, message.receiver, message.body);
    }

    fn on_connection_lost(&mut self, cause: DisconnectCause) {
        println!("* Seems you got disconnected ({cause:?}).");
    }

    fn current_presence(&self) -> Option<Presence> {
        Some(Presence {
            location: self.location.clone(),
            character: self.character.clone(),
        })
    }
}

fn display_name(sender: &str) -> &str {
    if sender == mystery::protocol::DEFAULT_SENDER {
        "You"
    } else {
        sender
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

const MAX_DICE: u32 = 100;
const MAX_SIDES: u32 = 1000;

/// Rolls dice written as `NdM`, e.g. `2d6` gives `2d6: 7`.
fn roll(spec: &str) -> Option<String> {
    let (count, sides) = spec.trim().split_once('d')?;
    let count: u32 = count.parse().ok()?;
    let sides: u32 = sides.parse().ok()?;
    if !(1..=MAX_DICE).contains(&count) || !(1..=MAX_SIDES).contains(&sides) {
        return None;
    }
    let mut rng = rand::rng();
    let total: u64 = (0..count)
        .map(|_| u64::from(rng.random_range(1..=sides)))
        .sum();
    Some(format!("{spec}: {total}"))
}

/// Applies one line of user input. Returns `false` to quit.
fn handle_input<T: ChatTransport>(client: &mut Client<T, Console>, line: &str) -> bool {
    let (command, rest) = match line.strip_prefix('/') {
        Some(cmd) => cmd.split_once(' ').unwrap_or((cmd, "")),
        None => {
            let presenter = client.presenter();
            let fields = ChatFields {
                location: presenter.location.clone(),
                sublocation: "Main".to_string(),
                character: presenter.character.clone().unwrap_or_default(),
                sprite_id: "1".to_string(),
                position: "center".to_string(),
                color_id: "0".to_string(),
                sprite_option: "0".to_string(),
            };
            client.send_chat(&fields, line);
            return true;
        }
    };

    match command {
        "ooc" => client.send_ooc(rest),
        "roll" => match roll(rest) {
            Some(result) => client.send_roll(&result),
            None => println!("* usage: /roll NdM"),
        },
        "loc" => {
            client.presenter_mut().location = rest.to_string();
            client.send_loc(rest);
        }
        "char" => {
            client.presenter_mut().character = Some(rest.to_string());
            client.send_char(rest);
        }
        "music" => client.send_music(rest),
        "stop" => client.send_music_stop(),
        "clear" => client.send_clear(),
        "pm" => match rest.split_once(' ') {
            Some((nick, text)) => client.send_private(nick, text),
            None => println!("* usage: /pm nick text"),
        },
        "quit" => return false,
        other => println!("* unknown command /{other}"),
    }
    true
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), MysteryError> {
    mystery::init_tracing("mystery=info,console_client=info");

    let mut args = std::env::args().skip(1);
    let server = args.next().unwrap_or_else(|| "localhost".to_string());
    let channel = args.next().unwrap_or_else(|| "#mystery-online".to_string());
    let username = args.next().unwrap_or_else(|| "Guest".to_string());

    let console = Console {
        location: "Hakuryou".to_string(),
        character: None,
    };
    let config = ClientConfig::default();
    let mut client = ClientBuilder::new()
        .config(config.clone())
        .server(&server)
        .channel(&channel)
        .username(&username)
        .connect(console)
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut scheduler = TickScheduler::new(config.tick);
    while !client.is_disconnected() {
        tokio::select! {
            tick = scheduler.wait_for_tick() => {
                client.pump(tick.now)?;
                scheduler.record_tick_end();
            }
            line = rx.recv() => {
                let keep_going = match line {
                    Some(line) if !line.trim().is_empty() => handle_input(&mut client, &line),
                    Some(_) => true,
                    None => false,
                };
                if !keep_going {
                    break;
                }
            }
        }
    }

    client.disconnect("Leaving").await;
    tracing::info!("bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_sums_within_range() {
        let result = roll("3d6").unwrap();
        let total: u64 = result.strip_prefix("3d6: ").unwrap().parse().unwrap();
        assert!((3..=18).contains(&total));
    }

    #[test]
    fn test_roll_rejects_out_of_range_dice() {
        assert_eq!(roll("0d6"), None);
        assert_eq!(roll("101d6"), None);
        assert_eq!(roll("2d0"), None);
        assert_eq!(roll(&format!("100d{}", u32::MAX)), None);
        assert_eq!(roll("2x6"), None);
    }

    #[test]
    fn test_roll_largest_allowed_does_not_overflow() {
        assert!(roll("100d1000").is_some());
    }
}
