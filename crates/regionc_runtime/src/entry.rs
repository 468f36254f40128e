use core::ffi::c_void;

/// Symbol every native module exports for its entrypoint.
pub const LIVE_ENTRY_SYMBOL: &str = "llvm_live_";

/// Return slot shared with generated code; wide enough for any primitive
/// or reference result.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResultCell(pub u64);

/// `(method, args, result, thread, image_base)`
pub type RawEntryPoint =
    unsafe extern "C" fn(*mut c_void, *mut u32, *mut ResultCell, *mut c_void, u32);

/// Thread state the runtime must expose while generated code runs.
pub trait ManagedThread {
    /// Opaque handle passed to generated code as its thread argument.
    fn context_token(&self) -> *mut c_void;

    fn set_in_native_code(&self, inside: bool);

    /// Generated code leaves a stale quick frame marker behind on return.
    fn clear_top_quick_frame(&self);
}

/// Resolved entrypoint of one loaded region.
#[derive(Debug, Clone, Copy)]
pub struct NativeEntryPoint {
    raw: RawEntryPoint,
}

impl NativeEntryPoint {
    pub const fn new(raw: RawEntryPoint) -> Self {
        Self { raw }
    }

    pub const fn raw(&self) -> RawEntryPoint {
        self.raw
    }

    /// Calls into the region with the thread marked as inside native code.
    ///
    /// # Safety
    ///
    /// `method` and `args` must be what the generated code expects for the
    /// method it was compiled from, and the module that exported this
    /// entrypoint must still be loaded.
    pub unsafe fn invoke<T: ManagedThread + ?Sized>(
        &self,
        thread: &T,
        method: *mut c_void,
        args: &mut [u32],
        image_base: u32,
    ) -> ResultCell {
        struct Exit<'a, T: ManagedThread + ?Sized>(&'a T);

        impl<T: ManagedThread + ?Sized> Drop for Exit<'_, T> {
            fn drop(&mut self) {
                self.0.set_in_native_code(false);
                self.0.clear_top_quick_frame();
            }
        }

        let mut result = ResultCell::default();
        thread.set_in_native_code(true);
        let exit = Exit(thread);
        // SAFETY: upheld by the caller
        unsafe {
            (self.raw)(
                method,
                args.as_mut_ptr(),
                &raw mut result,
                thread.context_token(),
                image_base,
            );
        }
        drop(exit);
        result
    }
}
