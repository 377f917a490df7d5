use std::io::Read;

use arenalloc::{FreeListAllocator, MemAlloc, NULL_ADDRESS, RangeTrackingAllocator};
use libc::{c_void, intptr_t, sbrk};

const ARENA_SIZE: usize = 4096;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_free_list(allocator: &FreeListAllocator<'_>) {
  for (offset, size) in allocator.free_blocks() {
    println!("    free block at +{offset:#06x}, {size} bytes");
  }
}

fn main() {
  env_logger::init();

  unsafe {
    print_program_break("start");

    // --------------------------------------------------------------------
    // 1) Grow the heap by one arena and hand it to the free-list allocator.
    //    The allocator only partitions it; the memory stays ours.
    // --------------------------------------------------------------------
    let arena = sbrk(ARENA_SIZE as intptr_t);
    if arena == usize::MAX as *mut c_void {
      eprintln!("sbrk failed");
      return;
    }
    print_program_break("after sbrk");

    let mut heap = match FreeListAllocator::from_raw_parts(arena as *mut u8, ARENA_SIZE, 16) {
      Ok(heap) => heap,
      Err(err) => {
        eprintln!("cannot manage arena: {err}");
        return;
      }
    };

    println!("\n[1] Arena at {:?}, {} bytes", arena, heap.capacity());
    print_free_list(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) A few allocations of odd sizes. Each one is rounded to 16 bytes and
    //    preceded by its header.
    // --------------------------------------------------------------------
    let sizes = [24, 100, 7, 256];
    let addresses: Vec<usize> = sizes.iter().map(|size| heap.allocate(*size)).collect();

    for (size, address) in sizes.iter().zip(&addresses) {
      println!("[2] allocate({size:>3}) = {address:#x}");
    }
    print_free_list(&heap);

    if let Ok(payload) = heap.block_mut(addresses[1]) {
      payload.fill(0xab);
      println!("[2] Filled second block with 0xAB ({} bytes)", payload.len());
    }
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the first and third blocks, then the second. The three
    //    neighbours merge back into a single free block.
    // --------------------------------------------------------------------
    heap.free(addresses[0]);
    heap.free(addresses[2]);
    println!("\n[3] Freed blocks 1 and 3");
    print_free_list(&heap);

    heap.free(addresses[1]);
    println!("[3] Freed block 2, neighbours coalesced");
    print_free_list(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Something that does not fit.
    // --------------------------------------------------------------------
    let too_big = heap.allocate(ARENA_SIZE);
    println!(
      "\n[4] allocate({ARENA_SIZE}) = {too_big:#x} ({})",
      if too_big == NULL_ADDRESS { "out of space" } else { "unexpected" }
    );
  }

  // ------------------------------------------------------------------------
  // 5) The range allocator needs no memory at all: here it hands out MMIO
  //    windows of a simulated device.
  // ------------------------------------------------------------------------
  let mut mmio = match RangeTrackingAllocator::with_base_address(0x1000, 0x100, 0xfe00_0000) {
    Ok(mmio) => mmio,
    Err(err) => {
      eprintln!("cannot create window: {err}");
      return;
    }
  };

  let uart = mmio.allocate(0x40);
  let gpio = mmio.allocate(0x200);
  println!("\n[5] uart window = {uart:#x}, gpio window = {gpio:#x}");

  mmio.free(uart);
  let timer = mmio.allocate(0x80);
  println!("[5] timer window = {timer:#x} (reuses the uart slot)");
  println!("[5] {} of {} bytes in use", mmio.bytes_used(), mmio.capacity());

  println!("\n[6] End of example. The arena is released with the process.");
}
