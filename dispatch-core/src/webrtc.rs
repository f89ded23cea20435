//! `WebRtcDataChannelConnection` (feature `webrtc`, off by default): the only place in
//! this crate an async runtime appears. It is strictly contained to a single dedicated
//! thread running a single-threaded Tokio runtime local to the bridge; no other module
//! is aware it exists, preserving §5's "parallel OS threads, no async runtime" contract
//! for the rest of the core.

use std::sync::Arc;
use std::thread;

use webrtc::data_channel::RTCDataChannel;

use crate::connection::Connection;

pub struct WebRtcDataChannelConnection {
    outbound: crossbeam_channel::Sender<Vec<u8>>,
    remote_ip: String,
}

impl WebRtcDataChannelConnection {
    /// Spawns one thread that owns a current-thread Tokio runtime and the data channel;
    /// `send_json` hands bytes across a crossbeam channel the bridge thread drains and
    /// forwards via `send_text`.
    pub fn spawn(data_channel: Arc<RTCDataChannel>, remote_ip: String) -> Arc<WebRtcDataChannelConnection> {
        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(256);

        thread::Builder::new()
            .name("webrtc-bridge".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build contained webrtc bridge runtime");

                runtime.block_on(async move {
                    for body in rx.iter() {
                        let text = String::from_utf8_lossy(&body).into_owned();
                        if data_channel.send_text(text).await.is_err() {
                            break;
                        }
                    }
                });
            })
            .expect("failed to spawn webrtc bridge thread");

        Arc::new(WebRtcDataChannelConnection {
            outbound: tx,
            remote_ip,
        })
    }
}

impl Connection for WebRtcDataChannelConnection {
    fn send_json(&self, body: Vec<u8>) {
        let _ = self.outbound.try_send(body);
    }

    fn remote_ip(&self) -> String {
        self.remote_ip.clone()
    }
}
