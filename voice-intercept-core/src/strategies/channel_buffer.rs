use std::ffi::{c_char, c_int, c_void, CString};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::alaw;
use crate::memory::voice_buffer::{HandedOffBuffer, VoiceFrameBuffer};
use crate::models::error::InterceptError;
use crate::models::instance::{Capabilities, ConnectionHandle};
use crate::models::state::{InterceptionState, StrategyTag};
use crate::sink::capture_sink::CaptureSink;
use crate::strategies::attempt;
use crate::strategies::context::StrategyContext;
use crate::traits::capture_strategy::CaptureStrategy;
use crate::worker::PollWorker;

/// `int send_command(void *client, const char *command)`; positive means accepted.
pub type SendCommandFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> c_int;
/// `int channel_read(void *client, int channel, uint8_t *buf, int len)`; returns bytes read.
pub type ChannelReadFn = unsafe extern "C" fn(*mut c_void, c_int, *mut u8, c_int) -> c_int;

struct ChannelSession {
    sink: Arc<CaptureSink>,
}

/// Strategy 4: hand the SDK an output buffer, ask the peer device to
/// stream audio, and drain what lands in the buffer.
///
/// Most invasive of the four. The buffer is only installed into a field
/// that still holds the configured sentinel, and once installed it is
/// kept for the rest of the process.
pub struct ChannelBufferCapture {
    worker: PollWorker,
    session: Mutex<Option<ChannelSession>>,
    /// Buffer installed by an earlier start, reused on restart.
    buffer: Mutex<Option<Arc<HandedOffBuffer>>>,
    stop_timeout: Duration,
}

impl ChannelBufferCapture {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            worker: PollWorker::new("channel-buffer-poll"),
            session: Mutex::new(None),
            buffer: Mutex::new(None),
            stop_timeout,
        }
    }

    /// Address of the installed buffer, if one has been handed off.
    pub fn buffer_address(&self) -> Option<usize> {
        self.buffer.lock().as_ref().map(|b| b.address())
    }

    fn send_commands(
        send: SendCommandFn,
        client: ConnectionHandle,
        commands: &[String],
    ) -> Result<(), InterceptError> {
        let mut accepted = 0;
        for command in commands {
            let c_command = CString::new(command.as_str()).map_err(|_| {
                InterceptError::ConfigurationFailed(format!("command {:?} contains a NUL byte", command))
            })?;
            // SAFETY: `client` is a live connection pointer and the string outlives the call.
            let rc = unsafe { send(client.as_raw() as *mut c_void, c_command.as_ptr()) };
            if rc > 0 {
                accepted += 1;
                log::info!("peer accepted {:?}", command);
            } else {
                log::warn!("peer rejected {:?} ({})", command, rc);
            }
        }
        if !commands.is_empty() && accepted == 0 {
            return Err(InterceptError::InterceptFailed(format!(
                "peer accepted none of {} commands",
                commands.len()
            )));
        }
        Ok(())
    }
}

impl CaptureStrategy for ChannelBufferCapture {
    fn tag(&self) -> StrategyTag {
        StrategyTag::ChannelBuffer
    }

    fn start(&self, ctx: &StrategyContext) -> Result<(), InterceptError> {
        let mut session = self.session.lock();
        if self.worker.is_running() {
            return Ok(());
        }

        attempt(ctx, self.tag(), || {
            let layout = ctx.discoverer.layout();
            let field = layout.output_buffer_field.as_str();
            let sentinel = ctx.config.buffer.sentinel;

            let player = ctx.discoverer.select_player(Capabilities::OUTPUT_BUFFER)?;
            let current = player.handle.read_pointer(field)?;
            let previous = self.buffer.lock().clone();
            let reuse = previous.as_ref().filter(|b| b.address() == current).cloned();
            if reuse.is_none() && current != sentinel {
                return Err(InterceptError::BufferStateInvalid(format!(
                    "{} at {:#x} already holds {:#x}",
                    field, player.address, current
                )));
            }

            let client = ctx
                .connection
                .or_else(|| ctx.discoverer.client_of(&player))
                .ok_or_else(|| InterceptError::InstanceNotFound("no client connection available".into()))?;

            let send_sym = ctx.resolver.resolve(&ctx.config.symbols.send_command)?;
            let read_sym = ctx
                .config
                .symbols
                .channel_read
                .as_deref()
                .and_then(|name| ctx.resolver.resolve_optional(name));
            ctx.sink.set_state(self.tag(), InterceptionState::Installed);

            let buffer = match reuse {
                Some(buffer) => buffer,
                None => {
                    let fresh = VoiceFrameBuffer::allocate(&ctx.config.buffer)?;
                    let installed = Arc::new(fresh.hand_off(player.handle.as_ref(), field, sentinel)?);
                    *self.buffer.lock() = Some(Arc::clone(&installed));
                    installed
                }
            };

            // SAFETY: resolved, non-null exports with the documented C signatures.
            let send: SendCommandFn = unsafe { std::mem::transmute::<usize, SendCommandFn>(send_sym.address) };
            let read: Option<ChannelReadFn> =
                read_sym.map(|s| unsafe { std::mem::transmute::<usize, ChannelReadFn>(s.address) });

            Self::send_commands(send, client, &ctx.config.channel.commands)?;

            let tag = self.tag();
            let sink = Arc::clone(&ctx.sink);
            let max_frame_bytes = ctx.config.max_frame_bytes;
            let channel = ctx.config.channel.channel_index;
            let mut scratch = vec![0u8; ctx.config.channel.max_read_bytes];
            let client_raw = client.as_raw();
            let buffer_address = buffer.address();

            self.worker.spawn(ctx.config.timeouts.poll_interval(), move |gate| {
                if let Some(pending) = buffer.take_pending() {
                    if pending.len() > max_frame_bytes {
                        sink.note_anomaly(
                            tag,
                            &InterceptError::DecodeAnomaly(format!(
                                "{} pending bytes exceed {}",
                                pending.len(),
                                max_frame_bytes
                            )),
                        );
                    } else {
                        let samples = alaw::decode_frame(&pending);
                        gate.pass(|| sink.on_frames(tag, &samples));
                    }
                }

                if let Some(read) = read {
                    let capacity = c_int::try_from(scratch.len()).unwrap_or(c_int::MAX);
                    // SAFETY: `scratch` is valid for `capacity` bytes for the duration of the call.
                    let n = unsafe { read(client_raw as *mut c_void, channel, scratch.as_mut_ptr(), capacity) };
                    if n > 0 {
                        let n = (n as usize).min(scratch.len());
                        let samples = alaw::decode_frame(&scratch[..n]);
                        gate.pass(|| sink.on_frames(tag, &samples));
                    }
                }
                true
            })?;

            log::info!(
                "voice buffer {:#x} installed on player {:#x}; polling",
                buffer_address,
                player.address
            );
            *session = Some(ChannelSession {
                sink: Arc::clone(&ctx.sink),
            });
            ctx.sink.set_state(self.tag(), InterceptionState::Active);
            Ok(())
        })
    }

    fn stop(&self) {
        self.worker.stop(self.stop_timeout);
        if let Some(session) = self.session.lock().take() {
            if session.sink.state(self.tag()) == InterceptionState::Active {
                session.sink.set_state(self.tag(), InterceptionState::Uninstalled);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_running()
    }
}

#[cfg(test)]
pub(crate) mod fake_client {
    use super::*;
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

    /// Channel tests share these statics and must not overlap.
    pub static SERIAL: Mutex<()> = parking_lot::const_mutex(());

    pub static SENT: Mutex<Vec<(usize, String)>> = parking_lot::const_mutex(Vec::new());
    pub static SEND_RESULT: AtomicI32 = AtomicI32::new(1);
    pub static CHANNEL_DATA: Mutex<Vec<u8>> = parking_lot::const_mutex(Vec::new());
    /// How long each channel read blocks before returning.
    pub static READ_DELAY_MS: AtomicU64 = AtomicU64::new(0);

    unsafe extern "C" fn fake_send(client: *mut c_void, command: *const c_char) -> c_int {
        let text = unsafe { CStr::from_ptr(command) }.to_string_lossy().into_owned();
        SENT.lock().push((client as usize, text));
        SEND_RESULT.load(Ordering::SeqCst)
    }

    unsafe extern "C" fn fake_read(_client: *mut c_void, _channel: c_int, buf: *mut u8, len: c_int) -> c_int {
        let delay = READ_DELAY_MS.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        let data = std::mem::take(&mut *CHANNEL_DATA.lock());
        let n = data.len().min(len as usize);
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), buf, n) };
        n as c_int
    }

    pub fn send_address() -> usize {
        fake_send as SendCommandFn as usize
    }

    pub fn read_address() -> usize {
        fake_read as ChannelReadFn as usize
    }

    pub fn reset() {
        SENT.lock().clear();
        CHANNEL_DATA.lock().clear();
        SEND_RESULT.store(1, Ordering::SeqCst);
        READ_DELAY_MS.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::fake_client::{self, CHANNEL_DATA, READ_DELAY_MS, SEND_RESULT, SENT, SERIAL};
    use super::*;
    use crate::strategies::test_support::Harness;
    use crate::testing::{wait_until, MockHandle, MockSymbols};
    use std::sync::atomic::Ordering;

    const WAIT: Duration = Duration::from_secs(2);

    fn player(buffer_field: usize) -> Arc<MockHandle> {
        let player = MockHandle::new(0x3000);
        player.set_pointer("voice_out_buff", buffer_field);
        player.set_pointer("client", 0xC0FFEE);
        player
    }

    fn client_symbols() -> MockSymbols {
        MockSymbols::new()
            .with("client_write_cgi", fake_client::send_address())
            .with("CSession_Data_Read", fake_client::read_address())
    }

    #[test]
    fn initialized_buffer_is_refused_before_any_side_effect() {
        let _serial = SERIAL.lock();
        fake_client::reset();
        let harness = Harness::with_symbols(client_symbols());
        let player = player(0xDEAD);
        harness.objects.add("AppIOSPlayer", player.clone());

        let capture = ChannelBufferCapture::new(Duration::from_millis(500));
        let err = capture.start(&harness.ctx).unwrap_err();

        assert!(matches!(err, InterceptError::BufferStateInvalid(_)));
        assert_eq!(player.write_count(), 0);
        assert_eq!(player.pointer("voice_out_buff"), Some(0xDEAD));
        assert!(SENT.lock().is_empty());
        assert_eq!(harness.ctx.sink.state(StrategyTag::ChannelBuffer), InterceptionState::Failed);
    }

    #[test]
    fn installs_buffer_sends_commands_and_drains() {
        let _serial = SERIAL.lock();
        fake_client::reset();
        let harness = Harness::with_symbols(client_symbols());
        let player = player(0);
        harness.objects.add("AppIOSPlayer", player.clone());

        let capture = ChannelBufferCapture::new(Duration::from_millis(500));
        capture.start(&harness.ctx).unwrap();

        let installed = capture.buffer_address().unwrap();
        assert_eq!(player.pointer("voice_out_buff"), Some(installed));
        assert_eq!(
            SENT.lock().clone(),
            vec![(0xC0FFEE, "audiostream.cgi?streamid=0&".to_string())]
        );

        // The SDK writes into the buffer it was given.
        unsafe { std::ptr::write_volatile(installed as *mut u8, 0x55) };
        let sink = &harness.ctx.sink;
        assert!(wait_until(WAIT, || sink.frames_for(StrategyTag::ChannelBuffer) >= 1));

        CHANNEL_DATA.lock().extend_from_slice(&[0xD5, 0x7F]);
        assert!(wait_until(WAIT, || sink.frames_for(StrategyTag::ChannelBuffer) >= 3));
        capture.stop();
        sink.deliver_pending();

        assert_eq!(harness.delegate.samples_for(StrategyTag::ChannelBuffer), vec![-8, 8, -848]);
        assert_eq!(sink.state(StrategyTag::ChannelBuffer), InterceptionState::Uninstalled);
    }

    #[test]
    fn read_outliving_stop_delivers_nothing() {
        let _serial = SERIAL.lock();
        fake_client::reset();
        READ_DELAY_MS.store(150, Ordering::SeqCst);
        CHANNEL_DATA.lock().push(0x55);
        let harness = Harness::with_symbols(client_symbols());
        harness.objects.add("AppIOSPlayer", player(0));

        let capture = ChannelBufferCapture::new(Duration::from_millis(20));
        capture.start(&harness.ctx).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        capture.stop();
        assert!(!capture.is_active());

        let sink = &harness.ctx.sink;
        let at_stop = sink.frames_for(StrategyTag::ChannelBuffer);
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(at_stop, 0);
        assert_eq!(sink.frames_for(StrategyTag::ChannelBuffer), 0);
        fake_client::reset();
    }

    #[test]
    fn restart_reuses_the_installed_buffer() {
        let _serial = SERIAL.lock();
        fake_client::reset();
        let harness = Harness::with_symbols(client_symbols());
        let player = player(0);
        harness.objects.add("AppIOSPlayer", player.clone());

        let capture = ChannelBufferCapture::new(Duration::from_millis(500));
        capture.start(&harness.ctx).unwrap();
        let first = capture.buffer_address();
        capture.stop();
        capture.start(&harness.ctx).unwrap();
        capture.stop();

        assert_eq!(capture.buffer_address(), first);
        assert_eq!(player.write_count(), 1);
    }

    #[test]
    fn rejected_commands_fail_the_attempt() {
        let _serial = SERIAL.lock();
        fake_client::reset();
        SEND_RESULT.store(-1, Ordering::SeqCst);
        let harness = Harness::with_symbols(client_symbols());
        harness.objects.add("AppIOSPlayer", player(0));

        let capture = ChannelBufferCapture::new(Duration::from_millis(500));
        let err = capture.start(&harness.ctx).unwrap_err();

        assert!(matches!(err, InterceptError::InterceptFailed(_)));
        assert!(!capture.is_active());
    }

    #[test]
    fn missing_send_command_leaves_strategy_uninstalled() {
        let _serial = SERIAL.lock();
        fake_client::reset();
        let harness = Harness::new();
        let player = player(0);
        harness.objects.add("AppIOSPlayer", player.clone());

        let capture = ChannelBufferCapture::new(Duration::from_millis(500));
        let err = capture.start(&harness.ctx).unwrap_err();

        assert_eq!(err, InterceptError::SymbolNotFound(vec!["client_write_cgi".into()]));
        assert_eq!(player.write_count(), 0);
        assert_eq!(harness.ctx.sink.state(StrategyTag::ChannelBuffer), InterceptionState::Uninstalled);
    }

    #[test]
    fn supplied_connection_takes_precedence() {
        let _serial = SERIAL.lock();
        fake_client::reset();
        let mut harness = Harness::with_symbols(client_symbols());
        harness.ctx.connection = ConnectionHandle::new(0xBEEF);
        harness.objects.add("AppIOSPlayer", player(0));

        let capture = ChannelBufferCapture::new(Duration::from_millis(500));
        capture.start(&harness.ctx).unwrap();
        capture.stop();

        assert_eq!(SENT.lock()[0].0, 0xBEEF);
    }
}
