//! Image-specific Huffman table construction for the encoder's optimize
//! mode. Code lengths come from a plain Huffman merge; a rebalancing pass
//! then folds anything longer than 16 bits back into range.

/// A table ready to be written into a DHT segment.
pub(crate) struct OptimizedTable {
    pub(crate) bits: [u8; 16],
    pub(crate) values: Vec<u8>,
}

/// Huffman code lengths per symbol, via repeated merging of the two least
/// frequent live nodes in a flat parent array.
fn build_code_lengths(frequencies: &[u32; 256]) -> [u32; 256] {
    let max_nodes = 512;
    let mut freq = vec![0u64; max_nodes];
    let mut parent = vec![-1i32; max_nodes];
    let mut symbol_nodes = [usize::MAX; 256];

    let mut node_count = 0usize;
    for (i, &f) in frequencies.iter().enumerate() {
        if f == 0 {
            continue;
        }
        freq[node_count] = f as u64;
        symbol_nodes[i] = node_count;
        node_count += 1;
    }

    let mut lengths = [0u32; 256];
    if node_count == 1 {
        let symbol = symbol_nodes.iter().position(|&n| n == 0).unwrap();
        lengths[symbol] = 1;
        return lengths;
    }

    let mut total = node_count;
    loop {
        let mut least1 = usize::MAX;
        let mut least2 = usize::MAX;
        for i in 0..total {
            if parent[i] != -1 {
                continue;
            }
            if least1 == usize::MAX || freq[i] < freq[least1] {
                least2 = least1;
                least1 = i;
            } else if least2 == usize::MAX || freq[i] < freq[least2] {
                least2 = i;
            }
        }
        if least2 == usize::MAX {
            break;
        }

        freq[total] = freq[least1] + freq[least2];
        parent[least1] = total as i32;
        parent[least2] = total as i32;
        total += 1;
    }

    for (i, length) in lengths.iter_mut().enumerate() {
        let mut node = symbol_nodes[i];
        if node == usize::MAX {
            continue;
        }
        let mut depth = 0u32;
        while parent[node] != -1 {
            depth += 1;
            node = parent[node] as usize;
        }
        *length = depth.max(1);
    }

    lengths
}

/// Moves codes longer than `max_len` up the histogram. Each trade removes a
/// pair of overlong codes, re-parents them one level shallower, and pays for
/// the freed prefix by demoting one code from a strictly shorter level, so
/// `bits[i]` decreases on every step and the Kraft sum is preserved.
fn limit_code_lengths(bits: &mut [u32], max_len: usize) {
    for i in (max_len + 1..bits.len()).rev() {
        while bits[i] > 0 {
            let mut j = i - 2;
            while j > 0 && bits[j] == 0 {
                j -= 1;
            }
            if j == 0 {
                break;
            }
            bits[i] -= 2;
            bits[i - 1] += 1;
            bits[j] -= 1;
            bits[j + 1] += 2;
        }
    }
}

/// Builds a DHT-ready table from observed symbol frequencies. A class with
/// no symbols at all still gets a one-entry table so the stream stays
/// structurally valid.
pub(crate) fn build_optimized(frequencies: &[u32; 256]) -> OptimizedTable {
    let mut frequencies = *frequencies;
    let mut symbols: Vec<usize> = (0..256).filter(|&i| frequencies[i] > 0).collect();
    if symbols.is_empty() {
        symbols.push(0);
        frequencies[0] = 1;
    }
    let count = symbols.len();

    // A merge over up to 256 symbols can reach depth 255, so the histogram
    // covers every possible length before limiting folds it down.
    let lengths = build_code_lengths(&frequencies);
    let mut bits = [0u32; 256];
    for &len in lengths.iter() {
        if len > 0 {
            bits[len as usize] += 1;
        }
    }

    limit_code_lengths(&mut bits, 16);

    // Rebalancing can leave the histogram covering more or fewer codes than
    // there are symbols; reconcile before assigning.
    let mut total: u32 = bits[1..=16].iter().sum();
    if total < count as u32 {
        bits[16] += count as u32 - total;
    } else if total > count as u32 {
        let mut extra = total - count as u32;
        for i in (1..=16).rev() {
            if extra == 0 {
                break;
            }
            let take = extra.min(bits[i]);
            bits[i] -= take;
            extra -= take;
        }
    }
    total = bits[1..=16].iter().sum();
    debug_assert_eq!(total as usize, count);

    // Short codes go to frequent symbols; ties break toward smaller values.
    symbols.sort_by(|&a, &b| {
        frequencies[b]
            .cmp(&frequencies[a])
            .then_with(|| a.cmp(&b))
    });

    let mut values = Vec::with_capacity(count);
    let mut index = 0usize;
    let mut bits_out = [0u8; 16];
    for len in 1..=16usize {
        bits_out[len - 1] = bits[len] as u8;
        for _ in 0..bits[len] {
            if index < symbols.len() {
                values.push(symbols[index] as u8);
                index += 1;
            }
        }
    }

    OptimizedTable {
        bits: bits_out,
        values,
    }
}
