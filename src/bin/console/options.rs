#[derive(Debug, Clone, structopt::StructOpt)]
#[structopt(name = "console", about = "Interactive console for VelocityDRIVE switches")]
pub struct Options {
    /// Serial device the switch is attached to, e.g. /dev/ttyACM0.
    pub port: String,

    /// UART baud rate.
    #[structopt(long, default_value = "115200")]
    pub baud: u32,
}
