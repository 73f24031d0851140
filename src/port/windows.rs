//! Windows comm driver built on overlapped I/O.
//!
//! The device is opened with `FILE_FLAG_OVERLAPPED`, so every read and write
//! is issued asynchronously and then awaited with `GetOverlappedResult`.
//! Each direction owns one `OVERLAPPED` and one manual-reset event for the
//! lifetime of the port, guarded by its own mutex: a reader never blocks a
//! writer, and two readers never share a completion event.

use super::error::{Result, SerialError};
use super::traits::{ModemStatus, PortConfig, SerialStream};
use crate::resolve::{self, CommSettings};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::iter;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use tracing::{debug, trace, warn};
use winapi::ctypes::c_void;
use winapi::shared::minwindef::{BOOL, DWORD, FALSE, FARPROC, HMODULE, LPDWORD, TRUE};
use winapi::shared::winerror::{ERROR_ACCESS_DENIED, ERROR_IO_PENDING, ERROR_SHARING_VIOLATION};
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::libloaderapi::{GetProcAddress, LoadLibraryW};
use winapi::um::minwinbase::{LPOVERLAPPED, LPSECURITY_ATTRIBUTES, OVERLAPPED};
use winapi::um::winbase::{
    CLRDTR, CLRRTS, COMMTIMEOUTS, DCB, DTR_CONTROL_DISABLE, DTR_CONTROL_ENABLE, EV_RXCHAR,
    FILE_FLAG_OVERLAPPED, LPCOMMTIMEOUTS, LPDCB, MS_CTS_ON, MS_DSR_ON, MS_RING_ON, MS_RLSD_ON,
    PURGE_RXABORT, PURGE_RXCLEAR, PURGE_TXABORT, PURGE_TXCLEAR, RTS_CONTROL_ENABLE, SETDTR,
    SETRTS,
};
use winapi::um::winnt::{FILE_ATTRIBUTE_NORMAL, GENERIC_READ, GENERIC_WRITE, HANDLE, LPCWSTR};

/// Driver queue sizes requested from `SetupComm`.
const QUEUE_SIZE: DWORD = 64;

type SetCommStateFn = unsafe extern "system" fn(HANDLE, LPDCB) -> BOOL;
type SetCommTimeoutsFn = unsafe extern "system" fn(HANDLE, LPCOMMTIMEOUTS) -> BOOL;
type SetCommMaskFn = unsafe extern "system" fn(HANDLE, DWORD) -> BOOL;
type SetupCommFn = unsafe extern "system" fn(HANDLE, DWORD, DWORD) -> BOOL;
type GetOverlappedResultFn = unsafe extern "system" fn(HANDLE, LPOVERLAPPED, LPDWORD, BOOL) -> BOOL;
type CreateEventWFn = unsafe extern "system" fn(LPSECURITY_ATTRIBUTES, BOOL, BOOL, LPCWSTR) -> HANDLE;
type HandleFn = unsafe extern "system" fn(HANDLE) -> BOOL;
type HandleDwordFn = unsafe extern "system" fn(HANDLE, DWORD) -> BOOL;
type GetCommModemStatusFn = unsafe extern "system" fn(HANDLE, LPDWORD) -> BOOL;
type CancelIoExFn = unsafe extern "system" fn(HANDLE, LPOVERLAPPED) -> BOOL;

/// Comm and event entry points resolved from kernel32 once per process.
struct Kernel32 {
    get_comm_state: SetCommStateFn,
    set_comm_state: SetCommStateFn,
    set_comm_timeouts: SetCommTimeoutsFn,
    set_comm_mask: SetCommMaskFn,
    setup_comm: SetupCommFn,
    get_overlapped_result: GetOverlappedResultFn,
    create_event: CreateEventWFn,
    reset_event: HandleFn,
    purge_comm: HandleDwordFn,
    escape_comm_function: HandleDwordFn,
    get_comm_modem_status: GetCommModemStatusFn,
    cancel_io_ex: CancelIoExFn,
}

/// The driver cannot work without these; a missing symbol aborts the process.
static KERNEL32: Lazy<Kernel32> = Lazy::new(|| match Kernel32::load() {
    Ok(table) => table,
    Err(e) => panic!("serial driver initialization failed: {e}"),
});

impl Kernel32 {
    fn load() -> std::result::Result<Self, String> {
        let module = unsafe { LoadLibraryW(wide("kernel32.dll").as_ptr()) };
        if module.is_null() {
            return Err(format!(
                "LoadLibrary(kernel32.dll): {}",
                io::Error::last_os_error()
            ));
        }

        unsafe {
            Ok(Self {
                get_comm_state: symbol(module, "GetCommState")?,
                set_comm_state: symbol(module, "SetCommState")?,
                set_comm_timeouts: symbol(module, "SetCommTimeouts")?,
                set_comm_mask: symbol(module, "SetCommMask")?,
                setup_comm: symbol(module, "SetupComm")?,
                get_overlapped_result: symbol(module, "GetOverlappedResult")?,
                create_event: symbol(module, "CreateEventW")?,
                reset_event: symbol(module, "ResetEvent")?,
                purge_comm: symbol(module, "PurgeComm")?,
                escape_comm_function: symbol(module, "EscapeCommFunction")?,
                get_comm_modem_status: symbol(module, "GetCommModemStatus")?,
                cancel_io_ex: symbol(module, "CancelIoEx")?,
            })
        }
    }
}

/// Look up `name` and reinterpret it as the function pointer type `F`.
///
/// Safety: `F` must be the exact signature of the exported function.
unsafe fn symbol<F: Copy>(module: HMODULE, name: &str) -> std::result::Result<F, String> {
    let cname: Vec<u8> = name.bytes().chain(iter::once(0)).collect();
    let addr: FARPROC = GetProcAddress(module, cname.as_ptr().cast());
    if addr.is_null() {
        return Err(format!("GetProcAddress({name}): {}", io::Error::last_os_error()));
    }
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<FARPROC>());
    Ok(mem::transmute_copy::<FARPROC, F>(&addr))
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(iter::once(0)).collect()
}

fn check(op: &'static str, ret: BOOL) -> Result<()> {
    if ret == FALSE {
        Err(SerialError::last_os_error(op))
    } else {
        Ok(())
    }
}

/// `COM10` and above only open through the `\\.\` device namespace.
fn device_path(name: &str) -> String {
    if name.starts_with('\\') {
        name.to_string()
    } else {
        format!(r"\\.\{name}")
    }
}

/// A kernel handle owned by this module.
struct OwnedHandle(HANDLE);

// Kernel handles may be used and closed from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle {
    fn release(self) -> HANDLE {
        let handle = self.0;
        mem::forget(self);
        handle
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// One direction's asynchronous-operation context.
struct Overlapped {
    // Boxed: the kernel writes to it while an operation is pending.
    inner: Box<OVERLAPPED>,
    event: OwnedHandle,
}

// Only touched through the per-direction mutex.
unsafe impl Send for Overlapped {}

impl Overlapped {
    fn new() -> Result<Self> {
        let event = unsafe { (KERNEL32.create_event)(ptr::null_mut(), TRUE, FALSE, ptr::null()) };
        if event.is_null() {
            return Err(SerialError::last_os_error("CreateEvent"));
        }
        let mut inner: Box<OVERLAPPED> = Box::new(unsafe { mem::zeroed() });
        inner.hEvent = event;
        Ok(Self {
            inner,
            event: OwnedHandle(event),
        })
    }

    /// Reset the event and clear state left by the previous operation.
    fn prepare(&mut self) -> Result<LPOVERLAPPED> {
        check("ResetEvent", unsafe { (KERNEL32.reset_event)(self.event.0) })?;
        *self.inner = unsafe { mem::zeroed() };
        self.inner.hEvent = self.event.0;
        Ok(&mut *self.inner as LPOVERLAPPED)
    }

    /// Block until the issued operation completes.
    fn wait(&mut self, handle: HANDLE, op: &'static str) -> Result<usize> {
        let mut transferred: DWORD = 0;
        let ok = unsafe {
            (KERNEL32.get_overlapped_result)(handle, &mut *self.inner, &mut transferred, TRUE)
        };
        if ok == FALSE {
            return Err(SerialError::last_os_error(op));
        }
        Ok(transferred as usize)
    }
}

/// An open Windows serial device.
pub struct Port {
    handle: AtomicPtr<c_void>,
    name: String,
    reader: Mutex<Overlapped>,
    writer: Mutex<Overlapped>,
}

impl Port {
    /// Resolve `config`, open the device and apply the settings.
    ///
    /// The device is opened without sharing, so a second open of the same
    /// port fails with [`SerialError::AlreadyLocked`].
    pub fn open(config: &PortConfig) -> Result<Self> {
        let settings = resolve::resolve_comm(config)?;
        let path = device_path(&config.name);

        let handle = unsafe {
            CreateFileW(
                wide(&path).as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL | FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            let err = io::Error::last_os_error();
            return match err.raw_os_error().map(|code| code as DWORD) {
                Some(ERROR_ACCESS_DENIED) | Some(ERROR_SHARING_VIOLATION) => {
                    Err(SerialError::AlreadyLocked(config.name.clone()))
                }
                _ => Err(SerialError::os("CreateFile", err)),
            };
        }
        let guard = OwnedHandle(handle);

        set_comm_state(handle, &settings)?;
        check("SetupComm", unsafe {
            (KERNEL32.setup_comm)(handle, QUEUE_SIZE, QUEUE_SIZE)
        })?;
        let mut timeouts = COMMTIMEOUTS {
            ReadIntervalTimeout: settings.timeouts.read_interval,
            ReadTotalTimeoutMultiplier: settings.timeouts.read_total_multiplier,
            ReadTotalTimeoutConstant: settings.timeouts.read_total_constant,
            WriteTotalTimeoutMultiplier: settings.timeouts.write_total_multiplier,
            WriteTotalTimeoutConstant: settings.timeouts.write_total_constant,
        };
        check("SetCommTimeouts", unsafe {
            (KERNEL32.set_comm_timeouts)(handle, &mut timeouts)
        })?;
        check("SetCommMask", unsafe {
            (KERNEL32.set_comm_mask)(handle, EV_RXCHAR)
        })?;

        let reader = Overlapped::new()?;
        let writer = Overlapped::new()?;

        debug!(
            port = %config.name,
            baud = settings.baud,
            byte_size = settings.byte_size,
            parity = settings.parity,
            stop_bits = settings.stop_bits,
            read_timeout_ms = settings.timeouts.read_total_constant,
            "opened serial port"
        );

        Ok(Self {
            handle: AtomicPtr::new(guard.release()),
            name: config.name.clone(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }

    fn raw(&self) -> Result<HANDLE> {
        let handle = self.handle.load(Ordering::Acquire);
        if handle.is_null() {
            Err(SerialError::Closed)
        } else {
            Ok(handle)
        }
    }

    fn escape(&self, function: DWORD) -> Result<()> {
        check("EscapeCommFunction", unsafe {
            (KERNEL32.escape_comm_function)(self.raw()?, function)
        })
    }

    /// Assert or clear the DTR line.
    pub fn set_dtr(&self, level: bool) -> Result<()> {
        self.escape(if level { SETDTR } else { CLRDTR })
    }

    /// Assert or clear the RTS line.
    pub fn set_rts(&self, level: bool) -> Result<()> {
        self.escape(if level { SETRTS } else { CLRRTS })
    }

    /// Read the modem input lines.
    pub fn modem_status(&self) -> Result<ModemStatus> {
        let mut status: DWORD = 0;
        check("GetCommModemStatus", unsafe {
            (KERNEL32.get_comm_modem_status)(self.raw()?, &mut status)
        })?;
        Ok(ModemStatus {
            cts: status & MS_CTS_ON != 0,
            dsr: status & MS_DSR_ON != 0,
            ring: status & MS_RING_ON != 0,
            dcd: status & MS_RLSD_ON != 0,
        })
    }
}

fn set_comm_state(handle: HANDLE, settings: &CommSettings) -> Result<()> {
    let mut dcb: DCB = unsafe { mem::zeroed() };
    dcb.DCBlength = mem::size_of::<DCB>() as DWORD;
    check("GetCommState", unsafe {
        (KERNEL32.get_comm_state)(handle, &mut dcb)
    })?;

    dcb.BaudRate = settings.baud;
    dcb.ByteSize = settings.byte_size;
    dcb.Parity = settings.parity;
    dcb.StopBits = settings.stop_bits;
    dcb.set_fBinary(TRUE as DWORD);
    dcb.set_fParity((settings.parity != resolve::dcb::NOPARITY) as DWORD);
    dcb.set_fOutxCtsFlow(0);
    dcb.set_fOutxDsrFlow(0);
    dcb.set_fDsrSensitivity(0);
    dcb.set_fOutX(0);
    dcb.set_fInX(0);
    dcb.set_fNull(0);
    dcb.set_fAbortOnError(0);
    dcb.set_fRtsControl(RTS_CONTROL_ENABLE);
    dcb.set_fDtrControl(if settings.dtr_enable {
        DTR_CONTROL_ENABLE
    } else {
        DTR_CONTROL_DISABLE
    });

    check("SetCommState", unsafe {
        (KERNEL32.set_comm_state)(handle, &mut dcb)
    })
}

fn pending_or(op: &'static str) -> Result<()> {
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(ERROR_IO_PENDING as i32) {
        Ok(())
    } else {
        Err(SerialError::os(op, err))
    }
}

impl SerialStream for Port {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let handle = self.raw()?;
        let mut ctx = self.reader.lock();
        let overlapped = ctx.prepare()?;

        let len = buf.len().min(DWORD::MAX as usize) as DWORD;
        let mut done: DWORD = 0;
        let ok = unsafe { ReadFile(handle, buf.as_mut_ptr().cast(), len, &mut done, overlapped) };
        if ok == FALSE {
            pending_or("ReadFile")?;
        }
        let n = ctx.wait(handle, "ReadFile")?;
        trace!(port = %self.name, bytes = n, "read");
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let handle = self.raw()?;
        let mut ctx = self.writer.lock();
        let overlapped = ctx.prepare()?;

        let len = buf.len().min(DWORD::MAX as usize) as DWORD;
        let mut done: DWORD = 0;
        let ok = unsafe { WriteFile(handle, buf.as_ptr().cast(), len, &mut done, overlapped) };
        if ok == FALSE {
            pending_or("WriteFile")?;
        }
        let n = ctx.wait(handle, "WriteFile")?;
        trace!(port = %self.name, bytes = n, "write");
        Ok(n)
    }

    fn flush(&self) -> Result<()> {
        check("PurgeComm", unsafe {
            (KERNEL32.purge_comm)(
                self.raw()?,
                PURGE_TXABORT | PURGE_RXABORT | PURGE_TXCLEAR | PURGE_RXCLEAR,
            )
        })?;
        debug!(port = %self.name, "purged transmit and receive queues");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let handle = self.handle.swap(ptr::null_mut(), Ordering::AcqRel);
        if handle.is_null() {
            return Ok(());
        }
        // Wake any thread parked in GetOverlappedResult; it sees
        // ERROR_OPERATION_ABORTED. Nothing pending is not an error here.
        unsafe {
            (KERNEL32.cancel_io_ex)(handle, ptr::null_mut());
        }
        check("CloseHandle", unsafe { CloseHandle(handle) })?;
        debug!(port = %self.name, "closed serial port");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(port = %self.name, error = %e, "error closing serial port on drop");
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("handle", &self.handle.load(Ordering::Relaxed))
            .finish()
    }
}
