use std::ffi::OsString;

use bytes::Bytes;
use futures::{
    AsyncWrite,
    AsyncWriteExt,
};
use rustyline_async::{
    Readline,
    ReadlineEvent,
    SharedWriter,
};
use structopt::StructOpt;

use codec::FrameType;
use velocityctl::{
    events,
    trace_catch,
    Controller,
    EventKind,
};

mod options;

pub use options::Options;

#[derive(structopt::StructOpt)]
#[structopt(setting = structopt::clap::AppSettings::NoBinaryName)]
enum Command {
    /// Check the device is alive.
    Ping,

    /// Identify the device.
    Info,

    SaveConfig,
    FactoryReset,
    Reboot,

    Get {
        uri: String,
    },

    Post {
        uri:     String,
        payload: Option<String>,
    },

    Put {
        uri:     String,
        payload: Option<String>,
    },

    Delete {
        uri: String,
    },

    Fetch {
        uri:     String,
        payload: Option<String>,
    },

    /// Send a raw frame: type character plus hex body.
    Raw {
        ty:      char,
        payload: Option<String>,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    velocityctl::trace::init();

    let opts: Options = Options::from_args();

    let (reader, writer) = velocityctl::connect_serial(opts.port, opts.baud).await?;
    let (controller, pump) = Controller::new(reader, writer);
    tokio::spawn(pump);

    let (mut rl, w) = Readline::new("> ".to_owned())?;

    tokio::spawn({
        let mut w = w.clone();
        let mut traces = controller.subscribe(EventKind::Trace);

        async move {
            while let Ok(event) = events::next_event(&mut traces).await {
                let line = format!("TRACE {}\n", String::from_utf8_lossy(&event.payload));
                trace_catch!(w.write_all(line.as_bytes()).await, "printing trace frame");
            }
        }
    });

    let mut w = w;

    loop {
        w.flush().await?;

        let line = match rl.readline().await {
            Ok(ReadlineEvent::Line(line)) => line,
            Ok(ReadlineEvent::Eof) | Ok(ReadlineEvent::Interrupted) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        rl.add_history_entry(line.clone());

        let words = match shlex::split(&line) {
            Some(x) => x,
            None => {
                w.write_all(b"failed to split line\n").await?;
                continue;
            },
        };

        if words.is_empty() {
            continue;
        }

        let command = match Command::from_iter_safe(words.into_iter().map(OsString::from)) {
            Ok(c) => c,
            Err(e) => {
                w.write_all(format!("command error: {e}\n").as_bytes()).await?;
                continue;
            },
        };

        if let Err(e) = run_command(&controller, command, &mut w).await {
            w.write_all(format!("error: {e}\n").as_bytes()).await?;
        }
    }
}

async fn run_command<W>(
    controller: &Controller<W>,
    command: Command,
    w: &mut SharedWriter,
) -> eyre::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Ping => {
            let line: &[u8] = if controller.ping().await { b"pong\n" } else { b"no pong\n" };
            w.write_all(line).await?;
        },

        Command::Info => {
            let info = controller.device_info().await?;
            w.write_all(format!("{info}\n").as_bytes()).await?;
        },

        Command::SaveConfig => {
            controller.save_config().await?;
            w.write_all(b"configuration saved\n").await?;
        },

        Command::FactoryReset => {
            controller.factory_reset().await?;
            w.write_all(b"factory defaults restored\n").await?;
        },

        Command::Reboot => {
            controller.reboot().await?;
            w.write_all(b"reboot requested\n").await?;
        },

        Command::Get { uri } => show(w, controller.coap_get(&uri).await?).await?,
        Command::Delete { uri } => show(w, controller.coap_delete(&uri).await?).await?,

        Command::Post { uri, payload } => {
            show(w, controller.coap_post(&uri, parse_payload(payload)?).await?).await?
        },
        Command::Put { uri, payload } => {
            show(w, controller.coap_put(&uri, parse_payload(payload)?).await?).await?
        },
        Command::Fetch { uri, payload } => {
            show(w, controller.coap_fetch(&uri, parse_payload(payload)?).await?).await?
        },

        Command::Raw { ty, payload } => {
            let ty = FrameType::from_wire(ty as u8)
                .ok_or_else(|| eyre::eyre!("unknown frame type {ty:?}"))?;
            let body = parse_payload(payload)?.unwrap_or_default();

            controller.link().send_frame(ty, &body).await?;
        },
    }

    Ok(())
}

fn parse_payload(payload: Option<String>) -> eyre::Result<Option<Bytes>> {
    Ok(payload.map(hex::decode).transpose()?.map(Bytes::from))
}

async fn show(w: &mut SharedWriter, payload: Option<Bytes>) -> eyre::Result<()> {
    match payload {
        Some(p) => {
            w.write_all(format!("{} bytes: {}\n", p.len(), hex::encode(&p)).as_bytes()).await?;
            w.write_all(format!("  {}\n", minicbor::display(&p)).as_bytes()).await?;
        },
        None => w.write_all(b"ok (no content)\n").await?,
    }

    Ok(())
}
