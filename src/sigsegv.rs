//! Crash containment for the riskiest calls into a freshly loaded core.
//!
//! Opaque third-party code gets to run on user-supplied data for the
//! first time during `retro_init` and the first `load_game`. This traps
//! a fatal `SIGSEGV` during that window and turns it into an ordinary
//! error instead of taking the whole frontend down. It is a last-resort
//! net, not a sandbox: anything `f` mutated before the fault is left in
//! an unknown state, since `siglongjmp` unwinds past it without running
//! destructors.

use std::cell::Cell;
use std::os::raw::c_int;
use std::ptr;

// No FFI crate exposes the `sig*jmp` family (unlike `setjmp`/`longjmp`,
// they're awkward to bind safely), so the pair is declared by hand here.
// The buffer is sized generously rather than matched exactly to any one
// platform's `sigjmp_buf` layout.
#[repr(C, align(16))]
struct SigJmpBuf([u8; 256]);

extern "C" {
    fn sigsetjmp(env: *mut SigJmpBuf, savesigs: c_int) -> c_int;
    fn siglongjmp(env: *mut SigJmpBuf, val: c_int) -> !;
}

thread_local! {
    static JUMP_BUF: Cell<*mut SigJmpBuf> = const { Cell::new(ptr::null_mut()) };
}

extern "C" fn handle_sigsegv(_signum: c_int) {
    let buf = JUMP_BUF.with(Cell::get);
    if buf.is_null() {
        // No guard installed for this fault; it really is fatal.
        std::process::abort();
    }
    unsafe { siglongjmp(buf, 1) };
}

/// Runs `f` with a `SIGSEGV` trap installed, returning `Err(())` if it
/// crashed instead of completing.
pub fn guard<R>(f: impl FnOnce() -> R) -> Result<R, ()> {
    unsafe {
        let mut new_action: libc::sigaction = std::mem::zeroed();
        let mut old_action: libc::sigaction = std::mem::zeroed();
        new_action.sa_sigaction = handle_sigsegv as usize;
        libc::sigemptyset(&mut new_action.sa_mask);

        if libc::sigaction(libc::SIGSEGV, &new_action, &mut old_action) != 0 {
            // Could not install the handler; run unguarded rather than
            // silently drop the crash-containment request entirely.
            return Ok(f());
        }

        let mut env: SigJmpBuf = std::mem::zeroed();
        let outcome = if sigsetjmp(&mut env, 1) == 0 {
            JUMP_BUF.with(|cell| cell.set(&mut env));
            Ok(f())
        } else {
            Err(())
        };

        JUMP_BUF.with(|cell| cell.set(ptr::null_mut()));
        libc::sigaction(libc::SIGSEGV, &old_action, ptr::null_mut());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_behaved_call_returns_its_value() {
        assert_eq!(guard(|| 2 + 2), Ok(4));
    }

    #[test]
    fn guarded_crash_is_reported_as_an_error() {
        let result = guard(|| unsafe { *(ptr::null_mut::<u8>()) = 1 });
        assert_eq!(result, Err(()));
    }
}
