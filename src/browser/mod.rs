pub mod automation;
pub mod connection;
pub mod headless;
pub mod session;

pub use automation::{PageAutomation, ScriptedAutomation};
pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;
pub use session::{CdpSessionProvider, DepthProbe, Session, SessionProgress, SessionProvider};
