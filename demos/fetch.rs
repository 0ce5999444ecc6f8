use std::env;

use seislink::{ArchiveClient, ArchiveOptions, Fields, StreamClient, StreamOptions};
use tracing_subscriber::EnvFilter;

fn window() -> Fields {
    Fields::new()
        .starttime("2019-07-25 00:00:00")
        .endtime("2019-07-25 01:00:00")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage:\n  cargo run --example fetch -- arclink <host:port> [user]\n  cargo run --example fetch -- seedlink <host:port>\n\nRequests one hour of VG.MEPAS HHZ (2019-07-25 00:00-01:00 UTC).\nRequires arclink_fetch or slinktool on PATH."
        );
        return;
    }
    let address = args[2].clone();

    let result = match args[1].as_str() {
        "arclink" => {
            let user = args.get(3).cloned().unwrap_or_else(|| "user".to_string());
            let opts = ArchiveOptions {
                address: Some(address),
                user: Some(user),
                data_format: "mseed".to_string(),
                ..ArchiveOptions::default()
            };
            ArchiveClient::new(opts).and_then(|mut client| {
                client.request(window().network("VG").station("MEPAS").channel("HHZ"))?;
                println!("{}", client.render_request()?);
                client.execute()
            })
        }
        "seedlink" => {
            let opts = StreamOptions {
                address: Some(address),
                ..StreamOptions::default()
            };
            StreamClient::new(opts).and_then(|mut client| {
                client.request(window())?;
                client.request(Fields::new().network("VG").station("MEPAS").channel("HHZ"))?;
                println!("-tw {} -S {}", client.render_time_window()?, client.render_stream_list()?);
                client.execute()
            })
        }
        _ => {
            eprintln!("Unknown protocol. Use: arclink|seedlink");
            std::process::exit(2);
        }
    };

    match result {
        Ok(exec) => println!("Saved data to {}", exec.output_file.display()),
        Err(e) => {
            eprintln!("fetch failed: {e}");
            std::process::exit(1);
        }
    }
}
