//! Icon preview through the Windows shell.
//!
//! The shell may scale or pick a different image than the icon directory declares, so this is
//! only used for previews. Use [`IconContainer`](crate::IconContainer) for a faithful copy.

use std::{ffi::c_void, mem, os::windows::ffi::OsStrExt, path::Path, ptr};

use image::RgbaImage;
use log::{debug, warn};
use windows_sys::Win32::{
    Graphics::Gdi::{
        CreateCompatibleDC, DeleteDC, DeleteObject, GetDIBits, GetObjectW, BITMAP, BITMAPINFO,
        BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC,
    },
    UI::{
        Shell::ExtractIconExW,
        WindowsAndMessaging::{DestroyIcon, GetIconInfo, HICON, ICONINFO},
    },
};

/// Icon handle destroyed when dropped.
struct IconHandle(HICON);
impl Drop for IconHandle {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { DestroyIcon(self.0) };
        }
    }
}

/// Bitmap handle deleted when dropped.
struct BitmapHandle(HBITMAP);
impl Drop for BitmapHandle {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { DeleteObject(self.0) };
        }
    }
}

/// Memory device context deleted when dropped.
struct DeviceContext(HDC);
impl Drop for DeviceContext {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { DeleteDC(self.0) };
        }
    }
}

/// Extract the first icon of the file through the shell and copy it into an owned image.
/// The large icon is preferred over the small one.
pub(crate) fn extract_shell_icon(path: &Path) -> Option<RgbaImage> {
    let wide = path.as_os_str().encode_wide().chain(Some(0)).collect::<Vec<u16>>();

    let mut large: HICON = ptr::null_mut();
    let mut small: HICON = ptr::null_mut();
    let count = unsafe { ExtractIconExW(wide.as_ptr(), 0, &mut large, &mut small, 1) };
    // both handles are released on every path below
    let large = IconHandle(large);
    let small = IconHandle(small);
    if count == 0 || count == u32::MAX {
        debug!("{}: shell returned no icon", path.display());
        return None;
    }

    let handle = if !large.0.is_null() { &large } else { &small };
    if handle.0.is_null() {
        return None;
    }
    let image = copy_icon(handle);
    if image.is_none() {
        warn!("{}: could not copy shell icon", path.display());
    }
    image
}

fn copy_icon(icon: &IconHandle) -> Option<RgbaImage> {
    let mut info: ICONINFO = unsafe { mem::zeroed() };
    if unsafe { GetIconInfo(icon.0, &mut info) } == 0 {
        return None;
    }
    let _mask = BitmapHandle(info.hbmMask);
    let color = BitmapHandle(info.hbmColor);
    if color.0.is_null() {
        // monochrome icons only carry a mask
        return None;
    }

    let mut bitmap: BITMAP = unsafe { mem::zeroed() };
    let size = mem::size_of::<BITMAP>() as i32;
    if unsafe { GetObjectW(color.0, size, &mut bitmap as *mut BITMAP as *mut c_void) } == 0 {
        return None;
    }
    let (width, height) = (bitmap.bmWidth, bitmap.bmHeight);
    if width <= 0 || height <= 0 || width > 256 || height > 256 {
        return None;
    }

    let context = DeviceContext(unsafe { CreateCompatibleDC(ptr::null_mut()) });
    if context.0.is_null() {
        return None;
    }

    let mut header: BITMAPINFO = unsafe { mem::zeroed() };
    header.bmiHeader = BITMAPINFOHEADER {
        biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
        biWidth: width,
        // negative height selects top-down rows
        biHeight: -height,
        biPlanes: 1,
        biBitCount: 32,
        biCompression: BI_RGB,
        ..unsafe { mem::zeroed() }
    };

    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    let lines = unsafe {
        GetDIBits(
            context.0,
            color.0,
            0,
            height as u32,
            pixels.as_mut_ptr() as *mut c_void,
            &mut header,
            DIB_RGB_COLORS,
        )
    };
    if lines == 0 {
        return None;
    }

    // BGRA to RGBA; icons without an alpha channel are fully opaque
    let opaque = pixels.chunks_exact(4).all(|pixel| pixel[3] == 0);
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
        if opaque {
            pixel[3] = 0xff;
        }
    }
    RgbaImage::from_raw(width as u32, height as u32, pixels)
}
