/// Checksum ICMP no layout histórico do ping.c/netkit.
///
/// As palavras são montadas em pares little-endian (byte `i` baixo, `i+1` alto),
/// o byte final de comprimento ímpar entra como valor simples, e o resultado
/// complementado tem os bytes trocados. Escrito em ordem de rede no cabeçalho,
/// produz os mesmos bytes que o checksum RFC 1071 clássico.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u16::from_le_bytes([word[0], word[1]]) as u32);
    }
    if let Some(&last) = words.remainder().first() {
        sum = sum.wrapping_add(last as u32);
    }

    // Dobra até caber em 16 bits
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    (!(sum as u16)).swap_bytes()
}
